/// TN3270E Protocol Constants
///
/// Sub-negotiation operations, reason codes, function codes and record header
/// values as specified in RFC 2355 (TN3270 Enhancements).
///
/// # References
/// - RFC 2355: TN3270 Enhancements
/// - RFC 1646: TN3270 Extensions for LUname and Printer Selection

/// Sub-negotiation operation codes
pub const OP_ASSOCIATE: u8 = 0;
pub const OP_CONNECT: u8 = 1;
pub const OP_DEVICE_TYPE: u8 = 2;
pub const OP_FUNCTIONS: u8 = 3;
pub const OP_IS: u8 = 4;
pub const OP_REASON: u8 = 5;
pub const OP_REJECT: u8 = 6;
pub const OP_REQUEST: u8 = 7;
pub const OP_SEND: u8 = 8;

/// Device-type REJECT reason codes
pub const REASON_CONN_PARTNER: u8 = 0;
pub const REASON_DEVICE_IN_USE: u8 = 1;
pub const REASON_INV_ASSOCIATE: u8 = 2;
pub const REASON_INV_DEVICE_NAME: u8 = 3;
pub const REASON_INV_DEVICE_TYPE: u8 = 4;
pub const REASON_TYPE_NAME_ERROR: u8 = 5;
pub const REASON_UNKNOWN_ERROR: u8 = 6;
pub const REASON_UNSUPPORTED_REQ: u8 = 7;

/// Function codes
pub const FUNC_BIND_IMAGE: u8 = 0;
pub const FUNC_DATA_STREAM_CTL: u8 = 1;
pub const FUNC_RESPONSES: u8 = 2;
pub const FUNC_SCS_CTL_CODES: u8 = 3;
pub const FUNC_SYSREQ: u8 = 4;
pub const FUNC_CONTENTION_RESOLUTION: u8 = 5;
pub const FUNC_SNA_SENSE: u8 = 6;

/// Record header data types
pub const DT_3270_DATA: u8 = 0x00;
pub const DT_SCS_DATA: u8 = 0x01;
pub const DT_RESPONSE: u8 = 0x02;
pub const DT_BIND_IMAGE: u8 = 0x03;
pub const DT_UNBIND: u8 = 0x04;
pub const DT_NVT_DATA: u8 = 0x05;
pub const DT_REQUEST: u8 = 0x06;
pub const DT_SSCP_LU_DATA: u8 = 0x07;
pub const DT_PRINT_EOJ: u8 = 0x08;
pub const DT_BID: u8 = 0x09;

/// Request flags
pub const RQF_ERR_COND_CLEARED: u8 = 0x00;
pub const RQF_SEND_DATA: u8 = 0x01;
pub const RQF_KEYBOARD_RESTORE: u8 = 0x02;

/// Response flags on 3270-DATA records
pub const RSF_NO_RESPONSE: u8 = 0x00;
pub const RSF_ERROR_RESPONSE: u8 = 0x01;
pub const RSF_ALWAYS_RESPONSE: u8 = 0x02;

/// Response flags on RESPONSE records
pub const RSF_POSITIVE_RESPONSE: u8 = 0x00;
pub const RSF_NEGATIVE_RESPONSE: u8 = 0x01;

/// Positive response payload
pub const POS_DEVICE_END: u8 = 0x00;

/// Negative response reasons
pub const NEG_COMMAND_REJECT: u8 = 0x00;
pub const NEG_INTERVENTION_REQUIRED: u8 = 0x01;
pub const NEG_OPERATION_CHECK: u8 = 0x02;
pub const NEG_COMPONENT_DISCONNECTED: u8 = 0x03;

/// Header length on the wire before escaping
pub const HEADER_LEN: usize = 5;

/// Sequence numbers wrap at this modulus
pub const SEQ_MODULUS: u16 = 0x8000;

pub fn op_name(op: u8) -> &'static str {
    match op {
        OP_ASSOCIATE => "ASSOCIATE",
        OP_CONNECT => "CONNECT",
        OP_DEVICE_TYPE => "DEVICE-TYPE",
        OP_FUNCTIONS => "FUNCTIONS",
        OP_IS => "IS",
        OP_REASON => "REASON",
        OP_REJECT => "REJECT",
        OP_REQUEST => "REQUEST",
        OP_SEND => "SEND",
        _ => "??",
    }
}

pub fn reason_name(reason: u8) -> &'static str {
    match reason {
        REASON_CONN_PARTNER => "CONN-PARTNER",
        REASON_DEVICE_IN_USE => "DEVICE-IN-USE",
        REASON_INV_ASSOCIATE => "INV-ASSOCIATE",
        REASON_INV_DEVICE_NAME => "INV-DEVICE-NAME",
        REASON_INV_DEVICE_TYPE => "INV-DEVICE-TYPE",
        REASON_TYPE_NAME_ERROR => "TYPE-NAME-ERROR",
        REASON_UNKNOWN_ERROR => "UNKNOWN-ERROR",
        REASON_UNSUPPORTED_REQ => "UNSUPPORTED-REQ",
        _ => "??",
    }
}

pub fn function_name(function: u8) -> &'static str {
    match function {
        FUNC_BIND_IMAGE => "BIND-IMAGE",
        FUNC_DATA_STREAM_CTL => "DATA-STREAM-CTL",
        FUNC_RESPONSES => "RESPONSES",
        FUNC_SCS_CTL_CODES => "SCS-CTL-CODES",
        FUNC_SYSREQ => "SYSREQ",
        FUNC_CONTENTION_RESOLUTION => "CONTENTION-RESOLUTION",
        FUNC_SNA_SENSE => "SNA-SENSE",
        _ => "??",
    }
}

pub fn data_type_name(data_type: u8) -> &'static str {
    match data_type {
        DT_3270_DATA => "3270-DATA",
        DT_SCS_DATA => "SCS-DATA",
        DT_RESPONSE => "RESPONSE",
        DT_BIND_IMAGE => "BIND-IMAGE",
        DT_UNBIND => "UNBIND",
        DT_NVT_DATA => "NVT-DATA",
        DT_REQUEST => "REQUEST",
        DT_SSCP_LU_DATA => "SSCP-LU-DATA",
        DT_PRINT_EOJ => "PRINT-EOJ",
        DT_BID => "BID",
        _ => "??",
    }
}
