//! TELNET option negotiation tests
//!
//! Drives `TelnetSession` with host byte sequences and checks the answers on
//! the wire and the mode the connection ends up in.

mod utils;

use proptest::prelude::*;
use tn3270r::telnet::{TelnetCommand, TelnetOption, TelnetSession, TelnetSettings, TelnetState};
use tn3270r::{ConnectionState, NullSink};
use utils::mock_network::RecordingSink;
use utils::{contains, init_logging, neg, sb};

const IAC: u8 = TelnetCommand::IAC as u8;
const WILL: u8 = TelnetCommand::WILL as u8;
const WONT: u8 = TelnetCommand::WONT as u8;
const DO: u8 = TelnetCommand::DO as u8;
const DONT: u8 = TelnetCommand::DONT as u8;
const EOR: u8 = TelnetCommand::EOR as u8;

const BINARY: u8 = TelnetOption::Binary as u8;
const ECHO: u8 = TelnetOption::Echo as u8;
const SGA: u8 = TelnetOption::SuppressGoAhead as u8;
const TM: u8 = TelnetOption::TimingMark as u8;
const TTYPE: u8 = TelnetOption::TerminalType as u8;
const OPT_EOR: u8 = TelnetOption::EndOfRecord as u8;
const NAWS: u8 = TelnetOption::NAWS as u8;
const NEW_ENVIRON: u8 = TelnetOption::NewEnvironment as u8;
const TN3270E: u8 = TelnetOption::TN3270E as u8;
const STARTTLS: u8 = TelnetOption::StartTls as u8;

fn session() -> TelnetSession {
    TelnetSession::new(TelnetSettings::default())
}

/// The exchange a TN3270 host (without TN3270E) runs at connect time
fn host_3270_negotiation() -> Vec<u8> {
    let mut data = Vec::new();
    data.extend(neg(DO, TTYPE));
    data.extend(sb(TTYPE, &[1]));
    data.extend(neg(DO, OPT_EOR));
    data.extend(neg(WILL, OPT_EOR));
    data.extend(neg(DO, BINARY));
    data.extend(neg(WILL, BINARY));
    data
}

fn negotiated_3270(sink: &mut RecordingSink) -> TelnetSession {
    let mut s = session();
    s.process(&host_3270_negotiation(), sink).unwrap();
    s.take_output();
    s
}

proptest! {
    /// Every byte following IAC lands the parser in exactly one state, and
    /// both bytes are consumed.
    #[test]
    fn prop_iac_command_dispatch(x in any::<u8>()) {
        let mut s = session();
        let processed = s.process(&[IAC, x], &mut NullSink).unwrap();
        prop_assert_eq!(processed.consumed, 2);
        prop_assert!(!processed.start_tls);

        let expected = match TelnetCommand::from_u8(x) {
            Some(TelnetCommand::WILL) => TelnetState::Will,
            Some(TelnetCommand::WONT) => TelnetState::Wont,
            Some(TelnetCommand::DO) => TelnetState::Do,
            Some(TelnetCommand::DONT) => TelnetState::Dont,
            Some(TelnetCommand::SB) => TelnetState::Sb,
            _ => TelnetState::Data,
        };
        prop_assert_eq!(s.state(), expected);
    }

    /// A host DO gets exactly one answer; repeating it is silent once the
    /// option is on, and refused again otherwise.
    #[test]
    fn prop_do_is_answered_once(option in any::<u8>()) {
        let mut s = session();
        s.process(&neg(DO, option), &mut NullSink).unwrap();
        let first = s.take_output();
        prop_assert!(
            first.starts_with(&[IAC, WILL, option]) || first == vec![IAC, WONT, option],
            "unexpected answer {:02x?}", first
        );

        s.process(&neg(DO, option), &mut NullSink).unwrap();
        let second = s.take_output();
        if option == TM {
            prop_assert_eq!(second, vec![IAC, WILL, TM]);
        } else if s.options().mine(option) {
            prop_assert!(second.is_empty());
        } else {
            prop_assert_eq!(second, vec![IAC, WONT, option]);
        }
    }

    /// Same for WILL: accepted options are acknowledged once.
    #[test]
    fn prop_will_is_answered_once(option in any::<u8>()) {
        let mut s = session();
        s.process(&neg(WILL, option), &mut NullSink).unwrap();
        let first = s.take_output();
        prop_assert!(first == vec![IAC, DO, option] || first == vec![IAC, DONT, option]);

        s.process(&neg(WILL, option), &mut NullSink).unwrap();
        let second = s.take_output();
        if s.options().his(option) {
            prop_assert!(second.is_empty());
        } else {
            prop_assert_eq!(second, vec![IAC, DONT, option]);
        }
    }

    /// Arbitrary host bytes never panic the parser, whatever the chunking.
    #[test]
    fn prop_arbitrary_input_is_survivable(data in proptest::collection::vec(any::<u8>(), 0..512), split in 0usize..512) {
        let mut s = session();
        let at = split.min(data.len());
        let mut sink = RecordingSink::default();
        let _ = s.process(&data[..at], &mut sink);
        let _ = s.process(&data[at..], &mut sink);
    }
}

/// Full 3270 negotiation with TTYPE, EOR and BINARY in both directions
#[test]
fn test_3270_mode_negotiation() {
    init_logging();
    let mut sink = RecordingSink::default();
    let mut s = session();
    assert_eq!(s.mode(), ConnectionState::TelnetPending);

    s.process(&host_3270_negotiation(), &mut sink).unwrap();
    assert_eq!(s.mode(), ConnectionState::Connected3270);

    let out = s.take_output();
    assert!(contains(&out, &[IAC, WILL, TTYPE]));
    let mut ttype_is = vec![0];
    ttype_is.extend_from_slice(b"IBM-3278-2-E");
    assert!(contains(&out, &sb(TTYPE, &ttype_is)));
    assert!(contains(&out, &[IAC, WILL, OPT_EOR]));
    assert!(contains(&out, &[IAC, DO, OPT_EOR]));
    assert!(contains(&out, &[IAC, WILL, BINARY]));
    assert!(contains(&out, &[IAC, DO, BINARY]));
    assert!(sink.nvt.is_empty());
}

/// Re-announcing options that are already on puts nothing on the wire
#[test]
fn test_reannounced_options_are_silent() {
    let mut sink = RecordingSink::default();
    let mut s = negotiated_3270(&mut sink);

    let mut again = Vec::new();
    again.extend(neg(DO, TTYPE));
    again.extend(neg(DO, OPT_EOR));
    again.extend(neg(WILL, OPT_EOR));
    again.extend(neg(DO, BINARY));
    again.extend(neg(WILL, BINARY));
    s.process(&again, &mut sink).unwrap();

    assert!(s.take_output().is_empty());
    assert_eq!(s.mode(), ConnectionState::Connected3270);
}

/// Host records are de-escaped and delivered at IAC EOR
#[test]
fn test_3270_record_delivery() {
    let mut sink = RecordingSink::default();
    let mut s = negotiated_3270(&mut sink);

    s.process(&[0xf5, 0xc3, IAC, IAC, 0x40, IAC, EOR], &mut sink).unwrap();
    assert_eq!(sink.records, vec![vec![0xf5, 0xc3, 0xff, 0x40]]);
}

/// The same record fed one byte at a time
#[test]
fn test_record_split_across_reads() {
    let mut sink = RecordingSink::default();
    let mut s = negotiated_3270(&mut sink);

    for byte in [0xf1, 0xc2, IAC, IAC, IAC, EOR] {
        s.process(&[byte], &mut sink).unwrap();
    }
    assert_eq!(sink.records, vec![vec![0xf1, 0xc2, 0xff]]);
}

/// Outbound records are IAC-escaped and end with IAC EOR
#[test]
fn test_outbound_3270_record() {
    let mut sink = RecordingSink::default();
    let mut s = negotiated_3270(&mut sink);

    s.send_3270_record(&[0x7d, 0x40, 0xff]).unwrap();
    assert_eq!(s.take_output(), vec![0x7d, 0x40, 0xff, 0xff, IAC, EOR]);
}

/// A Read Buffer style reply from the interpreter is sent straight back
#[test]
fn test_interpreter_output_is_returned() {
    let mut sink = RecordingSink {
        outcome: tn3270r::DecodeOutcome::OkWithOutput(vec![0x60, 0x40]),
        ..RecordingSink::default()
    };
    let mut s = negotiated_3270(&mut sink);

    s.process(&[0xf2, IAC, EOR], &mut sink).unwrap();
    assert_eq!(s.take_output(), vec![0x60, 0x40, IAC, EOR]);
}

/// Host turning BINARY off drops the session out of 3270 mode
#[test]
fn test_wont_binary_leaves_3270() {
    let mut sink = RecordingSink::default();
    let mut s = negotiated_3270(&mut sink);

    s.process(&neg(WONT, BINARY), &mut sink).unwrap();
    assert_eq!(s.take_output(), vec![IAC, DONT, BINARY]);
    assert_eq!(s.mode(), ConnectionState::ConnectedNvt);
    assert!(s.send_3270_record(&[0x7d]).is_err());
}

/// A host that echoes and suppresses go-ahead is a character-mode NVT
#[test]
fn test_character_mode_nvt() {
    let mut sink = RecordingSink::default();
    let mut s = session();

    let mut data = Vec::new();
    data.extend(neg(WILL, ECHO));
    data.extend(neg(WILL, SGA));
    data.extend_from_slice(b"login: ");
    s.process(&data, &mut sink).unwrap();

    assert_eq!(s.mode(), ConnectionState::ConnectedNvtChar);
    assert!(!s.line_mode());
    assert_eq!(sink.nvt, b"login: ");

    s.take_output();
    s.send_nvt(b"x\r", &mut sink).unwrap();
    assert_eq!(s.take_output(), b"x\r\0");
}

/// Plain text with no options at all means line mode with local editing
#[test]
fn test_line_mode_editing() {
    let mut sink = RecordingSink::default();
    let mut s = session();

    s.process(b"Welcome\r\n", &mut sink).unwrap();
    assert_eq!(s.mode(), ConnectionState::ConnectedNvt);
    assert!(s.line_mode());
    sink.nvt.clear();

    s.send_nvt(b"lx\x08s\r", &mut sink).unwrap();
    assert_eq!(s.take_output(), b"ls\r\n");
    assert_eq!(sink.nvt, b"lx\x08 \x08s\r\n");
}

/// Options that only some TN3270 hosts send do not leave the pending state
#[test]
fn test_partial_negotiation_stays_pending() {
    let mut s = session();
    s.process(&neg(DO, TTYPE), &mut NullSink).unwrap();
    s.process(&neg(DO, BINARY), &mut NullSink).unwrap();
    assert_eq!(s.mode(), ConnectionState::TelnetPending);
}

/// NAWS is answered with the configured screen size
#[test]
fn test_naws_reports_screen_size() {
    let mut s = session();
    s.process(&neg(DO, NAWS), &mut NullSink).unwrap();
    let out = s.take_output();
    let mut expected = vec![IAC, WILL, NAWS];
    expected.extend(sb(NAWS, &[0, 80, 0, 24]));
    assert_eq!(out, expected);
}

/// NEW-ENVIRON SEND USER is answered from the configured environment
#[test]
fn test_new_environ_user() {
    let mut settings = TelnetSettings::default();
    settings.environment = tn3270r::telnet::Environment::new(Some("OPER1".to_string()), None);
    let mut s = TelnetSession::new(settings);

    s.process(&neg(DO, NEW_ENVIRON), &mut NullSink).unwrap();
    assert_eq!(s.take_output(), vec![IAC, WILL, NEW_ENVIRON]);

    let mut request = vec![1, 0];
    request.extend_from_slice(b"USER");
    s.process(&sb(NEW_ENVIRON, &request), &mut NullSink).unwrap();

    let mut reply = vec![0, 0];
    reply.extend_from_slice(b"USER");
    reply.push(1);
    reply.extend_from_slice(b"OPER1");
    assert_eq!(s.take_output(), sb(NEW_ENVIRON, &reply));
}

/// STARTTLS is refused unless enabled
#[test]
fn test_starttls_refused_by_default() {
    let mut s = session();
    s.process(&neg(DO, STARTTLS), &mut NullSink).unwrap();
    assert_eq!(s.take_output(), vec![IAC, WONT, STARTTLS]);
}

/// SB STARTTLS FOLLOWS stops processing right after IAC SE
#[test]
fn test_starttls_follows_hands_over_remaining_bytes() {
    let settings = TelnetSettings {
        allow_starttls: true,
        ..TelnetSettings::default()
    };
    let mut s = TelnetSession::new(settings);

    s.process(&neg(DO, STARTTLS), &mut NullSink).unwrap();
    let mut expected = vec![IAC, WILL, STARTTLS];
    expected.extend(sb(STARTTLS, &[1]));
    assert_eq!(s.take_output(), expected);

    let mut data = sb(STARTTLS, &[1]);
    let follows_len = data.len();
    data.extend_from_slice(&[0x16, 0x03, 0x03]);
    let processed = s.process(&data, &mut NullSink).unwrap();
    assert!(processed.start_tls);
    assert_eq!(processed.consumed, follows_len);
    assert_eq!(s.mode(), ConnectionState::TelnetPending);
}

/// TN3270E is refused when disabled in the settings
#[test]
fn test_tn3270e_can_be_disabled() {
    let settings = TelnetSettings {
        allow_tn3270e: false,
        ..TelnetSettings::default()
    };
    let mut s = TelnetSession::new(settings);
    s.process(&neg(DO, TN3270E), &mut NullSink).unwrap();
    assert_eq!(s.take_output(), vec![IAC, WONT, TN3270E]);
}

/// Reset returns the session to a fresh connection
#[test]
fn test_reset_clears_negotiated_options() {
    let mut sink = RecordingSink::default();
    let mut s = negotiated_3270(&mut sink);
    s.reset();
    assert_eq!(s.mode(), ConnectionState::TelnetPending);
    assert!(s.options().enabled_mine().is_empty());
    assert!(s.options().enabled_his().is_empty());
}

/// Commands outside 3270 mode go out as bare IAC sequences
#[test]
fn test_break_interrupt_and_nop() {
    let mut s = session();
    s.send_break();
    s.send_interrupt();
    s.send_nop();
    assert_eq!(s.take_output(), vec![IAC, 243, IAC, 244, IAC, 241]);
}
