//! Progress reporting between workers and the orchestrator.
//!
//! Workers never touch the terminal. Each one sends immutable
//! [`ProgressUpdate`] messages over an mpsc channel keyed by a stable line
//! id; a single aggregator thread drains the channel on a fixed poll and
//! mirrors the state onto an indicatif [`MultiProgress`]. A `remove` message
//! is terminal for its key.

use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::collections::HashMap;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::time::Duration;

/// Line id 0 is reserved for the overall batch bar.
pub const OVERALL_KEY: usize = 0;

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// One state delta for a progress line. Fields left as `None` keep their
/// current value.
#[derive(Debug, Clone, Default)]
pub struct ProgressUpdate {
    pub key: usize,
    pub total: Option<u64>,
    pub completed: Option<u64>,
    pub advance: Option<u64>,
    pub description: Option<String>,
    pub visible: Option<bool>,
    /// Force a redraw even when nothing else changed.
    pub refresh: bool,
    /// Terminal: the line is cleared and its key forgotten.
    pub remove: bool,
}

/// Create the channel pair. The orchestrator keeps the [`ProgressChannel`]
/// to mint per-worker senders and must drop it before joining the
/// aggregator thread so disconnect detection fires.
pub fn progress_channel() -> (ProgressChannel, ProgressAggregator) {
    let (tx, rx) = mpsc::channel();
    (
        ProgressChannel { tx },
        ProgressAggregator {
            rx,
            multi: MultiProgress::new(),
            bars: HashMap::new(),
            retired: Vec::new(),
        },
    )
}

/// Sender factory held by the orchestrator.
#[derive(Debug, Clone)]
pub struct ProgressChannel {
    tx: Sender<ProgressUpdate>,
}

impl ProgressChannel {
    /// Hand out a sender for the given line id. Keys are assigned by the
    /// caller and stay with one worker for its whole lifetime.
    pub fn sender(&self, key: usize) -> ProgressSender {
        ProgressSender {
            key,
            tx: self.tx.clone(),
        }
    }
}

/// Worker-side handle bound to one progress line.
#[derive(Debug, Clone)]
pub struct ProgressSender {
    key: usize,
    tx: Sender<ProgressUpdate>,
}

impl ProgressSender {
    fn blank(&self) -> ProgressUpdate {
        ProgressUpdate {
            key: self.key,
            ..Default::default()
        }
    }

    /// Sends are fire-and-forget: a vanished aggregator must never fail a
    /// conversion.
    fn send(&self, update: ProgressUpdate) {
        let _ = self.tx.send(update);
    }

    pub fn describe(&self, description: impl Into<String>) {
        self.send(ProgressUpdate {
            description: Some(description.into()),
            ..self.blank()
        });
    }

    pub fn set_total(&self, total: u64) {
        self.send(ProgressUpdate {
            total: Some(total),
            ..self.blank()
        });
    }

    pub fn set_completed(&self, completed: u64) {
        self.send(ProgressUpdate {
            completed: Some(completed),
            ..self.blank()
        });
    }

    pub fn advance(&self, delta: u64) {
        self.send(ProgressUpdate {
            advance: Some(delta),
            ..self.blank()
        });
    }

    pub fn set_visible(&self, visible: bool) {
        self.send(ProgressUpdate {
            visible: Some(visible),
            ..self.blank()
        });
    }

    pub fn refresh(&self) {
        self.send(ProgressUpdate {
            refresh: true,
            ..self.blank()
        });
    }

    /// Retire this line. Further sends on the same key are ignored by the
    /// aggregator.
    pub fn remove(&self) {
        self.send(ProgressUpdate {
            remove: true,
            ..self.blank()
        });
    }
}

/// Receiver side: owns the terminal state and the bar per live key.
pub struct ProgressAggregator {
    rx: Receiver<ProgressUpdate>,
    multi: MultiProgress,
    bars: HashMap<usize, ProgressBar>,
    retired: Vec<usize>,
}

impl ProgressAggregator {
    pub fn hide(&mut self) {
        self.multi.set_draw_target(ProgressDrawTarget::hidden());
    }

    fn bar_style(key: usize) -> ProgressStyle {
        let template = if key == OVERALL_KEY {
            "{msg} [{bar:30.cyan/blue}] {pos}/{len}"
        } else {
            "  {spinner:.green} {msg}"
        };
        ProgressStyle::default_bar()
            .template(template)
            .unwrap_or_else(|_| ProgressStyle::default_bar())
    }

    fn apply(&mut self, update: ProgressUpdate) {
        if self.retired.contains(&update.key) {
            return;
        }
        if update.remove {
            if let Some(bar) = self.bars.remove(&update.key) {
                bar.finish_and_clear();
                self.multi.remove(&bar);
            }
            self.retired.push(update.key);
            return;
        }

        let bar = self
            .bars
            .entry(update.key)
            .or_insert_with(|| {
                let bar = self.multi.add(ProgressBar::new(0));
                bar.set_style(Self::bar_style(update.key));
                bar.enable_steady_tick(POLL_INTERVAL);
                bar
            })
            .clone();

        if let Some(total) = update.total {
            bar.set_length(total);
        }
        if let Some(completed) = update.completed {
            bar.set_position(completed);
        }
        if let Some(delta) = update.advance {
            bar.inc(delta);
        }
        if let Some(description) = update.description {
            bar.set_message(description);
        }
        match update.visible {
            Some(false) => bar.set_draw_target(ProgressDrawTarget::hidden()),
            Some(true) => bar.set_draw_target(ProgressDrawTarget::stderr()),
            None => {}
        }
        if update.refresh {
            bar.tick();
        }
    }

    /// Drain updates until every sender has gone away, polling on a fixed
    /// interval so the display stays live between messages.
    pub fn run(mut self) {
        loop {
            match self.rx.recv_timeout(POLL_INTERVAL) {
                Ok(update) => self.apply(update),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        for bar in self.bars.values() {
            bar.finish_and_clear();
        }
    }
}

/// Compose a `left … right` progress line fitting `width` columns, squeezing
/// the left part with a middle ellipsis when needed.
pub fn task_line(left: &str, right: &str, width: usize) -> String {
    let sep = "  ";
    let fixed = right.chars().count() + sep.chars().count();
    if fixed >= width {
        return right.chars().take(width).collect();
    }
    let room = width - fixed;
    let left_len = left.chars().count();
    if left_len <= room {
        let pad = room - left_len;
        return format!("{left}{}{sep}{right}", " ".repeat(pad));
    }
    if room < 3 {
        let shortened: String = left.chars().take(room).collect();
        return format!("{shortened}{sep}{right}");
    }
    let keep = room - 1;
    let head = keep / 2 + keep % 2;
    let tail = keep / 2;
    let start: String = left.chars().take(head).collect();
    let end: String = left.chars().skip(left_len - tail).collect();
    format!("{start}…{end}{sep}{right}")
}

/// Best guess at the terminal width for progress lines.
pub fn terminal_width() -> usize {
    console::Term::stderr().size().1 as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_line_is_padded_to_width() {
        let line = task_line("track.flac", "1/4", 30);
        assert_eq!(line.chars().count(), 30);
        assert!(line.starts_with("track.flac"));
        assert!(line.ends_with("1/4"));
    }

    #[test]
    fn long_left_gets_middle_ellipsis() {
        let left = "some very long artist - some very long title.flac";
        let line = task_line(left, "2/4", 30);
        assert_eq!(line.chars().count(), 30);
        assert!(line.contains('…'));
        assert!(line.ends_with("2/4"));
        // head and tail of the original survive
        assert!(line.starts_with("some"));
        assert!(line.contains(".flac"));
    }

    #[test]
    fn degenerate_width_keeps_right_side() {
        let line = task_line("abcdef", "9/9", 3);
        assert_eq!(line, "9/9");
    }

    #[test]
    fn updates_reach_the_aggregator_bars() {
        let (channel, mut agg) = progress_channel();
        agg.hide();
        let sender = channel.sender(1);

        sender.set_total(10);
        sender.describe("working");
        sender.advance(3);
        sender.advance(2);

        // drain synchronously without the poll loop
        while let Ok(update) = agg.rx.try_recv() {
            agg.apply(update);
        }
        let bar = agg.bars.get(&1).unwrap();
        assert_eq!(bar.length(), Some(10));
        assert_eq!(bar.position(), 5);
        assert_eq!(bar.message(), "working");
    }

    #[test]
    fn remove_is_terminal_for_a_key() {
        let (channel, mut agg) = progress_channel();
        agg.hide();
        let sender = channel.sender(2);

        sender.set_total(4);
        sender.remove();
        sender.advance(1); // ignored after removal

        while let Ok(update) = agg.rx.try_recv() {
            agg.apply(update);
        }
        assert!(!agg.bars.contains_key(&2));
        assert!(agg.retired.contains(&2));
    }

    #[test]
    fn run_exits_when_all_senders_drop() {
        let (channel, mut agg) = progress_channel();
        agg.hide();
        let sender = channel.sender(1);
        drop(channel);

        let handle = std::thread::spawn(move || agg.run());
        sender.describe("done");
        drop(sender);
        handle.join().unwrap();
    }
}
