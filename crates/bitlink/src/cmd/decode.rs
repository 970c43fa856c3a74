use bitlink_frame::{Event, FrameReceiver};

use crate::cmd::{parse_hex, DecodeArgs};
use crate::exit::{CliResult, SUCCESS};
use crate::output::{emit, hex_string, OutputFormat};

pub fn run(args: DecodeArgs, format: OutputFormat) -> CliResult<i32> {
    let bytes = parse_hex(&args.hex)?;

    let mut receiver = FrameReceiver::new();
    for byte in bytes {
        if let Some(event) = receiver.push(byte) {
            let (text, json) = describe(&event);
            emit(format, &text, &json);
        }
    }
    if !receiver.is_idle() {
        emit(
            format,
            "trailing partial frame",
            &serde_json::json!({ "frame": "partial" }),
        );
    }
    Ok(SUCCESS)
}

fn describe(event: &Event) -> (String, serde_json::Value) {
    match *event {
        Event::ReadRequest { index, size } => (
            format!("read-request index={index} size={size}"),
            serde_json::json!({
                "frame": "read-request",
                "index": index,
                "size": size,
            }),
        ),
        Event::ReadResponse { index, data, len } => payload_line("read-response", index, &data[..len as usize]),
        Event::WriteRequest { index, data, len } => payload_line("write-request", index, &data[..len as usize]),
        Event::ExecuteRequest { index, data, len } => payload_line("execute-request", index, &data[..len as usize]),
    }
}

fn payload_line(kind: &str, index: u8, data: &[u8]) -> (String, serde_json::Value) {
    (
        format!("{kind} index={index} data={}", hex_string(data)),
        serde_json::json!({
            "frame": kind,
            "index": index,
            "data": hex_string(data),
        }),
    )
}
