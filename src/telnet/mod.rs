//! TELNET layer: option codes, the negotiated option table, the byte-level
//! option FSM, the NEW-ENVIRON sub-option and the NVT output path.

pub mod codes;
pub mod environ;
pub mod nvt;
pub mod options;
pub mod session;

pub use codes::{TelnetCommand, TelnetOption};
pub use environ::Environment;
pub use options::OptionTable;
pub use session::{Processed, TelnetSession, TelnetSettings, TelnetState};
