use crate::local::LocalStore;
use crate::traits::MAX_TTL;
use bytes::Bytes;
use redis_protocol::resp2::types::BytesFrame;
use std::time::Duration;

/// Dispatch a RESP2 frame (expected to be an Array of bulk strings) against the store.
pub fn dispatch(frame: &BytesFrame, store: &LocalStore) -> BytesFrame {
    let args = match frame {
        BytesFrame::Array(arr) => arr,
        _ => return error_frame("ERR expected array"),
    };

    if args.is_empty() {
        return error_frame("ERR empty command");
    }

    let cmd = match &args[0] {
        BytesFrame::BulkString(b) => String::from_utf8_lossy(b).to_uppercase(),
        _ => return error_frame("ERR invalid command format"),
    };

    match cmd.as_str() {
        "PING" => BytesFrame::SimpleString("PONG".into()),
        "COMMAND" => BytesFrame::SimpleString("OK".into()),
        "GET" => {
            if args.len() != 2 {
                return arity_error("GET");
            }
            match store.lookup(&bulk_to_string(&args[1])) {
                Some(value) => BytesFrame::BulkString(value),
                None => BytesFrame::Null,
            }
        }
        "SET" => {
            if args.len() < 3 {
                return arity_error("SET");
            }
            let ttl = match parse_set_options(&args[3..]) {
                Ok(ttl) => ttl,
                Err(msg) => return error_frame(msg),
            };
            store.insert(bulk_to_string(&args[1]), bulk_to_bytes(&args[2]), ttl);
            BytesFrame::SimpleString("OK".into())
        }
        "DEL" => {
            if args.len() < 2 {
                return arity_error("DEL");
            }
            let removed = args[1..]
                .iter()
                .filter(|arg| store.delete(&bulk_to_string(arg)))
                .count();
            BytesFrame::Integer(removed as i64)
        }
        "EXISTS" => {
            if args.len() < 2 {
                return arity_error("EXISTS");
            }
            let present = args[1..]
                .iter()
                .filter(|arg| store.contains(&bulk_to_string(arg)))
                .count();
            BytesFrame::Integer(present as i64)
        }
        "TTL" => {
            if args.len() != 2 {
                return arity_error("TTL");
            }
            match store.ttl_remaining(&bulk_to_string(&args[1])) {
                Some(remaining) => BytesFrame::Integer(remaining.as_secs() as i64),
                None => BytesFrame::Integer(-2),
            }
        }
        other => error_frame(&format!("ERR unknown command '{other}'")),
    }
}

fn error_frame(msg: &str) -> BytesFrame {
    BytesFrame::Error(msg.into())
}

fn arity_error(cmd: &str) -> BytesFrame {
    error_frame(&format!(
        "ERR wrong number of arguments for '{cmd}' command"
    ))
}

fn bulk_to_string(frame: &BytesFrame) -> String {
    match frame {
        BytesFrame::BulkString(b) => String::from_utf8_lossy(b).into_owned(),
        _ => String::new(),
    }
}

fn bulk_to_bytes(frame: &BytesFrame) -> Bytes {
    match frame {
        BytesFrame::BulkString(b) => b.clone(),
        _ => Bytes::new(),
    }
}

/// Parse SET options: SET key value [EX seconds]. No option means the store default.
fn parse_set_options(args: &[BytesFrame]) -> Result<Duration, &'static str> {
    let mut ttl = Duration::ZERO;
    let mut i = 0;
    while i < args.len() {
        let opt = bulk_to_string(&args[i]).to_uppercase();
        match opt.as_str() {
            "EX" if i + 1 < args.len() => {
                let secs = bulk_to_string(&args[i + 1])
                    .parse::<u64>()
                    .map_err(|_| "ERR value is not an integer or out of range")?;
                if secs == 0 || secs > MAX_TTL.as_secs() {
                    return Err("ERR invalid expire time in 'set' command");
                }
                ttl = Duration::from_secs(secs);
                i += 2;
            }
            _ => return Err("ERR syntax error"),
        }
    }
    Ok(ttl)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cmd(parts: &[&'static str]) -> BytesFrame {
        BytesFrame::Array(
            parts
                .iter()
                .map(|p| BytesFrame::BulkString(Bytes::from_static(p.as_bytes())))
                .collect(),
        )
    }

    #[test]
    fn set_get_del() {
        let store = LocalStore::default();

        assert_eq!(
            dispatch(&cmd(&["SET", "k", "v", "EX", "30"]), &store),
            BytesFrame::SimpleString("OK".into())
        );
        assert_eq!(
            dispatch(&cmd(&["get", "k"]), &store),
            BytesFrame::BulkString(Bytes::from_static(b"v"))
        );
        assert_eq!(dispatch(&cmd(&["EXISTS", "k", "x"]), &store), BytesFrame::Integer(1));
        assert_eq!(dispatch(&cmd(&["DEL", "k", "x"]), &store), BytesFrame::Integer(1));
        assert_eq!(dispatch(&cmd(&["GET", "k"]), &store), BytesFrame::Null);
    }

    #[test]
    fn ttl_reports_remaining_or_missing() {
        let store = LocalStore::default();
        dispatch(&cmd(&["SET", "k", "v", "EX", "30"]), &store);

        match dispatch(&cmd(&["TTL", "k"]), &store) {
            BytesFrame::Integer(secs) => assert!((29..=30).contains(&secs)),
            other => panic!("unexpected reply {other:?}"),
        }
        assert_eq!(dispatch(&cmd(&["TTL", "nope"]), &store), BytesFrame::Integer(-2));
    }

    #[test]
    fn rejects_bad_input() {
        let store = LocalStore::default();

        assert!(matches!(dispatch(&cmd(&["GET"]), &store), BytesFrame::Error(_)));
        assert!(matches!(
            dispatch(&cmd(&["SET", "k", "v", "EX", "soon"]), &store),
            BytesFrame::Error(_)
        ));
        assert!(matches!(
            dispatch(&cmd(&["SET", "k", "v", "PX"]), &store),
            BytesFrame::Error(_)
        ));
        assert!(matches!(dispatch(&cmd(&["FLUSHALL"]), &store), BytesFrame::Error(_)));
        assert!(matches!(
            dispatch(&BytesFrame::SimpleString("PING".into()), &store),
            BytesFrame::Error(_)
        ));
        assert!(store.is_empty());
    }

    #[test]
    fn rejects_out_of_range_expiry() {
        let store = LocalStore::default();

        for secs in ["0", "18446744073709551615", "-1"] {
            assert!(matches!(
                dispatch(&cmd(&["SET", "k", "v", "EX", secs]), &store),
                BytesFrame::Error(_)
            ));
        }
        assert!(store.is_empty());

        let max = MAX_TTL.as_secs().to_string();
        let parts: [&[u8]; 5] = [b"SET", b"k", b"v", b"EX", max.as_bytes()];
        let set = BytesFrame::Array(
            parts
                .into_iter()
                .map(|p| BytesFrame::BulkString(Bytes::copy_from_slice(p)))
                .collect(),
        );
        assert_eq!(dispatch(&set, &store), BytesFrame::SimpleString("OK".into()));
        assert!(store.contains("k"));
    }
}
