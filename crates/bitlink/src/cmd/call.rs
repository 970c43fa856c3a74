use bitlink_peer::{Peer, MAX_PAYLOAD};
use bitlink_transport::{connect_unix, Transport};

use crate::cmd::{parse_hex, CallArgs};
use crate::exit::{peer_error, transport_error, CliError, CliResult, SUCCESS, USAGE};
use crate::output::{emit, hex_string, OutputFormat};

pub fn run(args: CallArgs, format: OutputFormat) -> CliResult<i32> {
    let data = match &args.data {
        Some(hex) => {
            let data = parse_hex(hex)?;
            if data.is_empty() || data.len() > MAX_PAYLOAD {
                return Err(CliError::new(
                    USAGE,
                    format!("--data takes 1..=8 bytes, got {}", data.len()),
                ));
            }
            Some(data)
        }
        None => None,
    };

    let transport =
        connect_unix(&args.path).map_err(|err| transport_error("connect failed", err))?;
    let mut peer = Peer::new(transport, 0, 0);
    match &data {
        Some(data) => peer.invoke(args.index, data),
        None => peer.invoke_bare(args.index),
    }
    .map_err(|err| peer_error("invoke failed", err))?;
    peer.transport_mut().flush_tx();

    let sent = data.as_deref().map(hex_string);
    emit(
        format,
        &match &sent {
            Some(hex) => format!("invoked index {} with {hex}", args.index),
            None => format!("invoked index {}", args.index),
        },
        &serde_json::json!({
            "index": args.index,
            "data": sent,
        }),
    );
    Ok(SUCCESS)
}
