//! Scripted station input for simulation runs.

use std::io::{self, BufReader, Read};
use std::path::Path;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel as xch;
use eyre::WrapErr;
use refill_core::{EventSender, PanicMonitor};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// A line for the tag reader: `<uid> [content]`.
    Tag(String),
    Press(String),
    Release(String),
    Panic,
    Wait(Duration),
}

pub fn parse_line(line: &str) -> eyre::Result<Option<Step>> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }
    let (cmd, rest) = line
        .split_once(char::is_whitespace)
        .map_or((line, ""), |(c, r)| (c, r.trim()));
    let step = match cmd {
        "tag" if !rest.is_empty() => Step::Tag(rest.to_string()),
        "press" if !rest.is_empty() => Step::Press(rest.to_string()),
        "release" if !rest.is_empty() => Step::Release(rest.to_string()),
        "panic" => Step::Panic,
        "wait" => {
            let ms: u64 = rest
                .parse()
                .wrap_err_with(|| format!("wait expects milliseconds, got {rest:?}"))?;
            Step::Wait(Duration::from_millis(ms))
        }
        _ => eyre::bail!("unrecognized script line {line:?}"),
    };
    Ok(Some(step))
}

pub fn load(path: &Path) -> eyre::Result<Vec<Step>> {
    let text = std::fs::read_to_string(path)
        .wrap_err_with(|| format!("read script {}", path.display()))?;
    let mut steps = Vec::new();
    for (n, line) in text.lines().enumerate() {
        if let Some(step) = parse_line(line).wrap_err_with(|| format!("script line {}", n + 1))? {
            steps.push(step);
        }
    }
    Ok(steps)
}

/// Byte stream over lines sent on a channel; ends when every sender is gone.
pub struct ChannelLines {
    rx: xch::Receiver<String>,
    buf: Vec<u8>,
    pos: usize,
}

impl ChannelLines {
    pub fn new(rx: xch::Receiver<String>) -> BufReader<Self> {
        BufReader::new(Self {
            rx,
            buf: Vec::new(),
            pos: 0,
        })
    }
}

impl Read for ChannelLines {
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        if self.pos >= self.buf.len() {
            let Ok(mut line) = self.rx.recv() else {
                return Ok(0);
            };
            line.push('\n');
            self.buf = line.into_bytes();
            self.pos = 0;
        }
        let n = out.len().min(self.buf.len() - self.pos);
        out[..n].copy_from_slice(&self.buf[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }
}

/// Play `steps` on a thread. Tag lines go to `tags`; the channel closes
/// when the script ends, which the reader reports as end of input.
pub fn play(
    steps: Vec<Step>,
    tags: xch::Sender<String>,
    events: EventSender,
    panic: PanicMonitor,
) -> io::Result<JoinHandle<()>> {
    thread::Builder::new().name("sim-script".into()).spawn(move || {
        for step in steps {
            tracing::debug!(?step, "script");
            match step {
                Step::Tag(line) => {
                    if tags.send(line).is_err() {
                        break;
                    }
                }
                Step::Press(ch) => {
                    events.pressed(&ch);
                }
                Step::Release(ch) => {
                    events.released(&ch);
                }
                Step::Panic => panic.trigger(),
                Step::Wait(d) => thread::sleep(d),
            }
        }
        tracing::debug!("script finished");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::io::BufRead;

    #[rstest]
    #[case("tag 04:A2:3B:1C", Some(Step::Tag("04:A2:3B:1C".into())))]
    #[case("tag DEADBEEF bottle 7", Some(Step::Tag("DEADBEEF bottle 7".into())))]
    #[case("  press tap ", Some(Step::Press("tap".into())))]
    #[case("release mineral", Some(Step::Release("mineral".into())))]
    #[case("panic", Some(Step::Panic))]
    #[case("wait 250", Some(Step::Wait(Duration::from_millis(250))))]
    #[case("# comment", None)]
    #[case("", None)]
    fn parses_script_lines(#[case] line: &str, #[case] expected: Option<Step>) {
        assert_eq!(parse_line(line).unwrap(), expected);
    }

    #[rstest]
    #[case("tag")]
    #[case("wait soon")]
    #[case("dance")]
    fn rejects_bad_lines(#[case] line: &str) {
        assert!(parse_line(line).is_err());
    }

    #[test]
    fn channel_lines_end_when_sender_drops() {
        let (tx, rx) = xch::unbounded();
        tx.send("AA BB".to_string()).unwrap();
        tx.send("CC".to_string()).unwrap();
        drop(tx);
        let lines: Vec<String> = ChannelLines::new(rx).lines().map(Result::unwrap).collect();
        assert_eq!(lines, vec!["AA BB", "CC"]);
    }
}
