use anyhow::Result;
use std::io::Write;
use std::str::FromStr;
use tokio::sync::broadcast;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;
use tracing_subscriber::fmt::MakeWriter;

/// Tees formatted log lines to a broadcast channel. Lines are echoed to
/// stderr unless suppressed; stdout belongs to command output.
#[derive(Clone)]
pub struct LogTap {
    sender: broadcast::Sender<String>,
    suppress_echo: bool,
}

impl LogTap {
    pub fn new(capacity: usize, suppress_echo: bool) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender,
            suppress_echo,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<String> {
        self.sender.subscribe()
    }
}

impl<'a> MakeWriter<'a> for LogTap {
    type Writer = LogTapWriter;

    fn make_writer(&'a self) -> Self::Writer {
        LogTapWriter {
            sender: self.sender.clone(),
            suppress_echo: self.suppress_echo,
        }
    }
}

pub struct LogTapWriter {
    sender: broadcast::Sender<String>,
    suppress_echo: bool,
}

impl Write for LogTapWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let line = String::from_utf8_lossy(buf).to_string();
        let _ = self.sender.send(line); // Ignored if no receivers
        if !self.suppress_echo {
            std::io::stderr().write_all(buf)?;
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        if !self.suppress_echo {
            std::io::stderr().flush()?;
        }
        Ok(())
    }
}

pub fn parse_level(level: &str) -> Result<Level> {
    Level::from_str(level.trim())
        .map_err(|_| anyhow::anyhow!("unknown log level `{}`", level))
}

/// Install the global subscriber. A second call is a no-op.
pub fn init_logging(level: &str, tap: LogTap) -> Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(parse_level(level)?)
        .with_writer(tap)
        .finish();
    tracing::subscriber::set_global_default(subscriber).ok();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writer_forwards_to_subscribers() {
        let tap = LogTap::new(8, true);
        let mut rx = tap.subscribe();
        let mut writer = tap.make_writer();
        writer.write_all(b"INFO hello\n").unwrap();
        assert_eq!(rx.try_recv().unwrap(), "INFO hello\n");
    }

    #[test]
    fn writer_without_subscribers_still_succeeds() {
        let tap = LogTap::new(8, true);
        let mut writer = tap.make_writer();
        assert_eq!(writer.write(b"dropped").unwrap(), 7);
    }

    #[test]
    fn levels_parse_case_insensitively() {
        assert_eq!(parse_level("debug").unwrap(), Level::DEBUG);
        assert_eq!(parse_level(" WARN ").unwrap(), Level::WARN);
        assert!(parse_level("chatty").is_err());
    }
}
