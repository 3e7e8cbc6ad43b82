//! TELNET command and option codes (RFC 854, RFC 855 and extensions)
//!
//! Also holds the small builders for IAC sequences shared by the option FSM,
//! the TN3270E layer and the NVT output path.

/// Telnet command codes (RFC 854, RFC 885 for EOR)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TelnetCommand {
    /// Interpret As Command - 255 (0xFF)
    IAC = 255,
    /// Don't - 254 (0xFE)
    DONT = 254,
    /// Do - 253 (0xFD)
    DO = 253,
    /// Won't - 252 (0xFC)
    WONT = 252,
    /// Will - 251 (0xFB)
    WILL = 251,
    /// Subnegotiation Begin - 250 (0xFA)
    SB = 250,
    /// Go Ahead - 249 (0xF9)
    GA = 249,
    /// Erase Line - 248 (0xF8)
    EL = 248,
    /// Erase Character - 247 (0xF7)
    EC = 247,
    /// Are You There - 246 (0xF6)
    AYT = 246,
    /// Abort Output - 245 (0xF5)
    AO = 245,
    /// Interrupt Process - 244 (0xF4)
    IP = 244,
    /// Break - 243 (0xF3)
    BRK = 243,
    /// Data Mark - 242 (0xF2)
    DM = 242,
    /// No Operation - 241 (0xF1)
    NOP = 241,
    /// Subnegotiation End - 240 (0xF0)
    SE = 240,
    /// End Of Record - 239 (0xEF)
    EOR = 239,
    /// Abort - 238 (0xEE)
    ABORT = 238,
    /// Suspend - 237 (0xED)
    SUSP = 237,
    /// End Of File - 236 (0xEC)
    XEOF = 236,
}

impl TelnetCommand {
    /// Convert a byte to a TelnetCommand
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            255 => Some(TelnetCommand::IAC),
            254 => Some(TelnetCommand::DONT),
            253 => Some(TelnetCommand::DO),
            252 => Some(TelnetCommand::WONT),
            251 => Some(TelnetCommand::WILL),
            250 => Some(TelnetCommand::SB),
            249 => Some(TelnetCommand::GA),
            248 => Some(TelnetCommand::EL),
            247 => Some(TelnetCommand::EC),
            246 => Some(TelnetCommand::AYT),
            245 => Some(TelnetCommand::AO),
            244 => Some(TelnetCommand::IP),
            243 => Some(TelnetCommand::BRK),
            242 => Some(TelnetCommand::DM),
            241 => Some(TelnetCommand::NOP),
            240 => Some(TelnetCommand::SE),
            239 => Some(TelnetCommand::EOR),
            238 => Some(TelnetCommand::ABORT),
            237 => Some(TelnetCommand::SUSP),
            236 => Some(TelnetCommand::XEOF),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            TelnetCommand::IAC => "IAC",
            TelnetCommand::DONT => "DONT",
            TelnetCommand::DO => "DO",
            TelnetCommand::WONT => "WONT",
            TelnetCommand::WILL => "WILL",
            TelnetCommand::SB => "SB",
            TelnetCommand::GA => "GA",
            TelnetCommand::EL => "EL",
            TelnetCommand::EC => "EC",
            TelnetCommand::AYT => "AYT",
            TelnetCommand::AO => "AO",
            TelnetCommand::IP => "IP",
            TelnetCommand::BRK => "BREAK",
            TelnetCommand::DM => "DATA MARK",
            TelnetCommand::NOP => "NOP",
            TelnetCommand::SE => "SE",
            TelnetCommand::EOR => "EOR",
            TelnetCommand::ABORT => "ABORT",
            TelnetCommand::SUSP => "SUSP",
            TelnetCommand::XEOF => "EOF",
        }
    }
}

/// Telnet options this front end knows by name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TelnetOption {
    /// Binary Transmission - 0
    Binary = 0,
    /// Echo - 1
    Echo = 1,
    /// Suppress Go Ahead - 3
    SuppressGoAhead = 3,
    /// Timing Mark - 6
    TimingMark = 6,
    /// Terminal Type - 24
    TerminalType = 24,
    /// End of Record - 25
    EndOfRecord = 25,
    /// Negotiate About Window Size - 31
    NAWS = 31,
    /// Linemode - 34
    Linemode = 34,
    /// New Environment - 39
    NewEnvironment = 39,
    /// TN3270 Enhancements - 40
    TN3270E = 40,
    /// STARTTLS - 46
    StartTls = 46,
}

impl TelnetOption {
    /// Convert a byte to a TelnetOption
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(TelnetOption::Binary),
            1 => Some(TelnetOption::Echo),
            3 => Some(TelnetOption::SuppressGoAhead),
            6 => Some(TelnetOption::TimingMark),
            24 => Some(TelnetOption::TerminalType),
            25 => Some(TelnetOption::EndOfRecord),
            31 => Some(TelnetOption::NAWS),
            34 => Some(TelnetOption::Linemode),
            39 => Some(TelnetOption::NewEnvironment),
            40 => Some(TelnetOption::TN3270E),
            46 => Some(TelnetOption::StartTls),
            _ => None,
        }
    }

    /// Get the option name as used in traces
    pub fn name(&self) -> &'static str {
        match self {
            TelnetOption::Binary => "BINARY",
            TelnetOption::Echo => "ECHO",
            TelnetOption::SuppressGoAhead => "SGA",
            TelnetOption::TimingMark => "TIMING-MARK",
            TelnetOption::TerminalType => "TTYPE",
            TelnetOption::EndOfRecord => "EOR",
            TelnetOption::NAWS => "NAWS",
            TelnetOption::Linemode => "LINEMODE",
            TelnetOption::NewEnvironment => "NEW-ENVIRON",
            TelnetOption::TN3270E => "TN3270E",
            TelnetOption::StartTls => "START-TLS",
        }
    }
}

/// Trace name for any option byte
pub fn option_name(option: u8) -> String {
    match TelnetOption::from_u8(option) {
        Some(opt) => opt.name().to_string(),
        None => format!("<unknown option {option}>"),
    }
}

/// Trace name for any command byte
pub fn command_name(command: u8) -> String {
    match TelnetCommand::from_u8(command) {
        Some(cmd) => cmd.name().to_string(),
        None => format!("<unknown command {command}>"),
    }
}

/// TTYPE sub-negotiation verbs (RFC 1091)
pub const TTYPE_IS: u8 = 0;
pub const TTYPE_SEND: u8 = 1;

/// STARTTLS sub-negotiation verb (RFC draft-altman-telnet-starttls)
pub const STARTTLS_FOLLOWS: u8 = 1;

pub const IAC: u8 = TelnetCommand::IAC as u8;

/// Build a telnet negotiation sequence, e.g. `IAC WILL BINARY`
pub fn build_negotiation(command: TelnetCommand, option: u8) -> [u8; 3] {
    [IAC, command as u8, option]
}

/// Build a two-byte command such as `IAC IP`
pub fn build_command(command: TelnetCommand) -> [u8; 2] {
    [IAC, command as u8]
}

/// Append `data` to `out`, doubling every IAC byte
pub fn escape_iac_into(out: &mut Vec<u8>, data: &[u8]) {
    for &byte in data {
        out.push(byte);
        if byte == IAC {
            out.push(IAC);
        }
    }
}

/// Build a telnet subnegotiation sequence `IAC SB <option> <data> IAC SE`
pub fn build_subnegotiation(option: u8, data: &[u8]) -> Vec<u8> {
    let mut result = Vec::with_capacity(data.len() + 5);
    result.extend_from_slice(&[IAC, TelnetCommand::SB as u8, option]);
    escape_iac_into(&mut result, data);
    result.push(IAC);
    result.push(TelnetCommand::SE as u8);
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_telnet_command_conversion() {
        assert_eq!(TelnetCommand::from_u8(255), Some(TelnetCommand::IAC));
        assert_eq!(TelnetCommand::from_u8(239), Some(TelnetCommand::EOR));
        assert_eq!(TelnetCommand::from_u8(100), None);
        for byte in 236..=255u8 {
            assert_eq!(TelnetCommand::from_u8(byte).map(|c| c as u8), Some(byte));
        }
    }

    #[test]
    fn test_telnet_option_conversion() {
        assert_eq!(TelnetOption::from_u8(40), Some(TelnetOption::TN3270E));
        assert_eq!(TelnetOption::from_u8(46), Some(TelnetOption::StartTls));
        assert_eq!(option_name(25), "EOR");
        assert_eq!(option_name(200), "<unknown option 200>");
    }

    #[test]
    fn test_build_negotiation() {
        assert_eq!(build_negotiation(TelnetCommand::WILL, 0), [255, 251, 0]);
    }

    #[test]
    fn test_build_subnegotiation_escapes_iac() {
        let seq = build_subnegotiation(31, &[0, 80, 0, 255]);
        assert_eq!(seq, vec![255, 250, 31, 0, 80, 0, 255, 255, 255, 240]);
    }
}
