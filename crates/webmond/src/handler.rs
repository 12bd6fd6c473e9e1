//! Command handler for the monitor socket
//!
//! | Command | Reply |
//! |---------|-------|
//! | `OBSERVE <addr> <payload>` | `:1` if recorded, `:0` if skipped |
//! | `DOMAINS` / `SEARCHES` | report, oldest first |
//! | `RESTORE <queue> <capacity> <snapshot>` | imported line count |
//! | `SAVE` | `+OK` once snapshots are on disk |
//! | `INFO` | configuration and counters |
//! | `RESETSTATS` | `+OK` once the counters are zeroed |

use crate::persist::SnapshotStore;
use crate::resp::RespValue;
use std::sync::Arc;
use tracing::{info, warn};
use webmon::{is_http_request, parse_address, QueueKind};
use webmoncache::{ControlMessage, WebMonitor};

pub struct CommandHandler {
    monitor: Arc<WebMonitor>,
    store: Arc<SnapshotStore>,
}

impl CommandHandler {
    pub fn new(monitor: Arc<WebMonitor>, store: Arc<SnapshotStore>) -> Self {
        Self { monitor, store }
    }

    pub fn handle(&self, cmd: RespValue) -> RespValue {
        let arr = match cmd {
            RespValue::Array(Some(arr)) if !arr.is_empty() => arr,
            _ => return RespValue::err("invalid command format"),
        };

        let command = match arr[0].as_bytes() {
            Some(name) => String::from_utf8_lossy(name).to_uppercase(),
            None => return RespValue::err("invalid command"),
        };
        let args = &arr[1..];

        match command.as_str() {
            "PING" => self.handle_ping(args),
            "ECHO" => self.handle_echo(args),
            "OBSERVE" => self.handle_observe(args),
            "DOMAINS" => self.handle_report(QueueKind::Domains, args),
            "SEARCHES" => self.handle_report(QueueKind::Searches, args),
            "RESTORE" => self.handle_restore(args),
            "SAVE" => self.handle_save(),
            "INFO" => self.handle_info(),
            "RESETSTATS" => self.handle_reset_stats(),
            "COMMAND" => RespValue::Array(Some(vec![])),
            _ => RespValue::err(format!("unknown command '{}'", command)),
        }
    }

    fn handle_ping(&self, args: &[RespValue]) -> RespValue {
        match args {
            [] => RespValue::SimpleString("PONG".to_string()),
            [msg] => msg.clone(),
            _ => wrong_arity("ping"),
        }
    }

    fn handle_echo(&self, args: &[RespValue]) -> RespValue {
        match args {
            [msg] => msg.clone(),
            _ => wrong_arity("echo"),
        }
    }

    fn handle_observe(&self, args: &[RespValue]) -> RespValue {
        let (addr, payload) = match args {
            [addr, payload] => (addr, payload),
            _ => return wrong_arity("observe"),
        };

        let source = match addr.as_str().map(parse_address) {
            Some(Ok(source)) => source,
            _ => return RespValue::err("invalid source address"),
        };
        let payload = match payload.as_bytes() {
            Some(payload) => payload,
            None => return RespValue::err("invalid payload"),
        };

        if !is_http_request(payload) {
            return RespValue::Integer(0);
        }

        RespValue::Integer(self.monitor.observe_request(source, payload) as i64)
    }

    fn handle_report(&self, kind: QueueKind, args: &[RespValue]) -> RespValue {
        if !args.is_empty() {
            return wrong_arity(kind.as_str());
        }
        RespValue::text(self.monitor.report(kind))
    }

    fn handle_restore(&self, args: &[RespValue]) -> RespValue {
        let (queue, capacity, snapshot) = match args {
            [queue, capacity, snapshot] => (queue, capacity, snapshot),
            _ => return wrong_arity("restore"),
        };

        let queue = match queue.as_str().map(str::parse::<QueueKind>) {
            Some(Ok(queue)) => queue,
            Some(Err(e)) => return RespValue::err(e.to_string()),
            None => return RespValue::err("invalid queue"),
        };
        let capacity = match capacity.as_str().and_then(|s| s.parse::<i64>().ok()) {
            Some(capacity) => capacity,
            None => return RespValue::err("capacity is not an integer"),
        };
        let snapshot = match snapshot.as_str() {
            Some(snapshot) => snapshot.to_string(),
            None => return RespValue::err("snapshot is not valid UTF-8"),
        };

        let message = ControlMessage {
            queue,
            capacity,
            snapshot,
        };

        match self.monitor.restore(&message) {
            Ok(summary) => {
                info!(
                    queue = %queue,
                    capacity,
                    imported = summary.imported,
                    skipped = summary.skipped,
                    "Queue restored"
                );
                RespValue::Integer(summary.imported as i64)
            }
            Err(e) => {
                warn!(queue = %queue, capacity, error = %e, "Restore rejected");
                RespValue::err(e.to_string())
            }
        }
    }

    fn handle_save(&self) -> RespValue {
        match self.store.save(&self.monitor) {
            Ok(()) => RespValue::ok(),
            Err(e) => RespValue::err(format!("{:#}", e)),
        }
    }

    fn handle_reset_stats(&self) -> RespValue {
        self.monitor.stats().reset();
        info!("Statistics reset");
        RespValue::ok()
    }

    fn handle_info(&self) -> RespValue {
        let config = self.monitor.config();
        let stats = self.monitor.stats();
        let info = format!(
            "# Server\r\n\
             webmond_version:{}\r\n\
             \r\n\
             # Queues\r\n\
             domains:{}\r\n\
             max_domains:{}\r\n\
             searches:{}\r\n\
             max_searches:{}\r\n\
             \r\n\
             # Stats\r\n\
             observations:{}\r\n\
             promotions:{}\r\n\
             insertions:{}\r\n\
             evictions:{}\r\n\
             dropped:{}\r\n\
             imported:{}\r\n\
             skipped_lines:{}\r\n\
             promotion_ratio:{:.2}\r\n",
            env!("CARGO_PKG_VERSION"),
            self.monitor.len(QueueKind::Domains),
            config.max_domains,
            self.monitor.len(QueueKind::Searches),
            config.max_searches,
            stats.observations(),
            stats.promotions(),
            stats.insertions(),
            stats.evictions(),
            stats.dropped(),
            stats.imported(),
            stats.skipped_lines(),
            stats.promotion_ratio(),
        );
        RespValue::text(info)
    }
}

fn wrong_arity(command: &str) -> RespValue {
    RespValue::err(format!("wrong number of arguments for '{}' command", command))
}
