//! Negotiated TELNET option state

use super::codes::TelnetOption;

/// Which options are in effect on each side of the connection.
///
/// "Mine" are options this client has agreed to perform (`WILL`), "his" are
/// options the host performs (`DO`). Only the option FSM mutates the table.
#[derive(Clone)]
pub struct OptionTable {
    mine: [bool; 256],
    his: [bool; 256],
}

impl OptionTable {
    pub fn new() -> Self {
        Self {
            mine: [false; 256],
            his: [false; 256],
        }
    }

    pub fn mine(&self, option: u8) -> bool {
        self.mine[option as usize]
    }

    pub fn his(&self, option: u8) -> bool {
        self.his[option as usize]
    }

    pub fn my_option(&self, option: TelnetOption) -> bool {
        self.mine(option as u8)
    }

    pub fn his_option(&self, option: TelnetOption) -> bool {
        self.his(option as u8)
    }

    /// Returns true if the value changed
    pub fn set_mine(&mut self, option: u8, enabled: bool) -> bool {
        let changed = self.mine[option as usize] != enabled;
        self.mine[option as usize] = enabled;
        changed
    }

    /// Returns true if the value changed
    pub fn set_his(&mut self, option: u8, enabled: bool) -> bool {
        let changed = self.his[option as usize] != enabled;
        self.his[option as usize] = enabled;
        changed
    }

    pub fn reset(&mut self) {
        self.mine = [false; 256];
        self.his = [false; 256];
    }

    /// Option numbers enabled on our side, for diagnostics
    pub fn enabled_mine(&self) -> Vec<u8> {
        (0..=255u8).filter(|&opt| self.mine(opt)).collect()
    }

    /// Option numbers enabled on the host side, for diagnostics
    pub fn enabled_his(&self) -> Vec<u8> {
        (0..=255u8).filter(|&opt| self.his(opt)).collect()
    }
}

impl Default for OptionTable {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for OptionTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OptionTable")
            .field("mine", &self.enabled_mine())
            .field("his", &self.enabled_his())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_reports_change() {
        let mut table = OptionTable::new();
        assert!(table.set_mine(TelnetOption::Binary as u8, true));
        assert!(!table.set_mine(TelnetOption::Binary as u8, true));
        assert!(table.my_option(TelnetOption::Binary));
        assert!(!table.his_option(TelnetOption::Binary));
    }

    #[test]
    fn test_reset_clears_both_sides() {
        let mut table = OptionTable::new();
        table.set_mine(255, true);
        table.set_his(0, true);
        table.reset();
        assert!(table.enabled_mine().is_empty());
        assert!(table.enabled_his().is_empty());
    }
}
