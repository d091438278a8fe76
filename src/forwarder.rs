//! Serial-to-broker forwarding loop
//!
//! Reads one line at a time from a [`LineSource`], turns it into a
//! [`Reading`] and publishes the reading on a single topic:
//! - Empty reads (timeouts) publish nothing
//! - Lines that are not integers are dropped without complaint
//! - Any source or broker failure ends the loop with an error
//! - A shutdown request ends the loop cleanly; a line that arrives while
//!   the request is pending is not published

use crate::broker::Publisher;
use crate::reading::{parse_reading, Reading};
use crate::shutdown::Shutdown;
use crate::source::{LineRead, LineSource};
use anyhow::{Context, Result};
use chrono::Local;
use colored::Colorize;

/// Outcome of one loop iteration
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// Nothing arrived before the read timeout
    Idle,
    /// A reading went out to the broker
    Published(Reading),
    /// A line arrived but was not an integer
    Discarded,
    /// The source has no more input
    Closed,
    /// Shutdown was requested while the read was blocked
    Interrupted,
}

/// Counters kept over the lifetime of a forwarder
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ForwardStats {
    pub lines: usize,
    pub published: usize,
    pub discarded: usize,
    pub idle_reads: usize,
}

/// Forwarder over a line source and a broker session
pub struct Forwarder<S: LineSource, P: Publisher> {
    source: S,
    publisher: P,
    topic: String,
    show_timestamps: bool,
    stats: ForwardStats,
    last_reading: Option<Reading>,
}

impl<S: LineSource, P: Publisher> Forwarder<S, P> {
    pub fn new(source: S, publisher: P, topic: &str) -> Self {
        Self {
            source,
            publisher,
            topic: topic.to_string(),
            show_timestamps: true,
            stats: ForwardStats::default(),
            last_reading: None,
        }
    }

    /// Enable or disable timestamp prefixes on publish lines
    pub fn with_timestamps(mut self, show: bool) -> Self {
        self.show_timestamps = show;
        self
    }

    /// Read one line and forward it
    ///
    /// The shutdown flag is checked after the read returns so that a
    /// reading which raced with Ctrl+C is dropped rather than published.
    pub fn step(&mut self, shutdown: &Shutdown) -> Result<Step> {
        let read = self.source.read_line()?;
        if shutdown.is_requested() {
            return Ok(Step::Interrupted);
        }
        self.handle(read)
    }

    /// Forward the result of a single read
    ///
    /// Every step that does not publish services the broker connection, so
    /// a board printing only non-integer lines still keeps the session alive.
    fn handle(&mut self, read: LineRead) -> Result<Step> {
        let line = match read {
            LineRead::Line(line) => line,
            LineRead::Idle => {
                self.stats.idle_reads += 1;
                self.keep_alive()?;
                return Ok(Step::Idle);
            }
            LineRead::Closed => return Ok(Step::Closed),
        };

        if line.trim().is_empty() {
            self.stats.idle_reads += 1;
            self.keep_alive()?;
            return Ok(Step::Idle);
        }
        self.stats.lines += 1;

        let Some(reading) = parse_reading(&line) else {
            self.stats.discarded += 1;
            log::debug!("Ignoring non-integer line: {:?}", line);
            self.keep_alive()?;
            return Ok(Step::Discarded);
        };

        self.publisher
            .publish(&self.topic, &reading.payload())
            .with_context(|| format!("Failed to publish reading {} to {}", reading, self.topic))?;

        self.stats.published += 1;
        self.last_reading = Some(reading);
        println!("{}", self.format_published(reading));

        Ok(Step::Published(reading))
    }

    fn keep_alive(&mut self) -> Result<()> {
        self.publisher
            .service()
            .context("Broker connection lost while idle")
    }

    /// Loop until shutdown is requested or the source closes
    pub fn run(&mut self, shutdown: &Shutdown) -> Result<ForwardStats> {
        self.print_header();

        let last = loop {
            if shutdown.is_requested() {
                break Step::Interrupted;
            }

            match self.step(shutdown)? {
                Step::Published(reading) => log::debug!("Published reading {}", reading),
                Step::Idle | Step::Discarded => {}
                stop @ (Step::Closed | Step::Interrupted) => break stop,
            }
        };

        if last == Step::Closed {
            println!("\n{}", "Input closed.".yellow().bold());
        } else {
            println!("\n{}", "Stopped by user.".yellow().bold());
        }

        if let Err(e) = self.publisher.disconnect() {
            log::warn!("Error while disconnecting from broker: {}", e);
        } else {
            println!("{} Disconnected from {}", "[OK]".green().bold(), self.publisher.describe());
        }

        self.print_summary();
        Ok(self.stats)
    }

    /// Format a publish line for display
    fn format_published(&self, reading: Reading) -> String {
        let mut output = String::new();

        if self.show_timestamps {
            let timestamp = Local::now().format("%H:%M:%S%.3f");
            output.push_str(&format!("{} ", timestamp.to_string().dimmed()));
        }

        output.push_str(&format!(
            "{} {}={}",
            "[PUB]".green().bold(),
            self.topic.cyan(),
            reading.to_string().white().bold()
        ));

        output
    }

    fn print_header(&self) {
        println!("{}", "=".repeat(70).dimmed());
        println!("{}: {}", "Source".cyan(), self.source.describe().white());
        println!("{}: {}", "Broker".cyan(), self.publisher.describe().white());
        println!("{}: {}", "Topic".cyan(), self.topic.white());
        println!("{}", "=".repeat(70).dimmed());
        println!("{}", "Press Ctrl+C to stop\n".yellow());
    }

    fn print_summary(&self) {
        println!("\n{}", "=".repeat(70).dimmed());
        println!("{}", "--- Forwarding Summary ---".cyan().bold());
        println!("Lines received: {}", self.stats.lines);
        println!(
            "Readings published: {}",
            self.stats.published.to_string().green()
        );
        println!(
            "Lines discarded: {}",
            if self.stats.discarded > 0 {
                self.stats.discarded.to_string().yellow().to_string()
            } else {
                self.stats.discarded.to_string()
            }
        );
        if let Some(reading) = self.last_reading {
            println!("Last reading: {}", reading.to_string().white().bold());
        }
        println!("{}", "=".repeat(70).dimmed());
    }
}
