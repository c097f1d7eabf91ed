//! The observation channel - a line-oriented text sink for replay traces, disconnect warnings
//! and fallback notices.

use std::{
    fmt,
    sync::{Arc, Mutex},
};

/// Receives lines of observational output. Cloning an observer shares its sink.
#[derive(Clone)]
pub struct Observer {
    sink: Arc<dyn Fn(&str) + Send + Sync>,
}

impl Observer {
    pub fn new<F>(sink: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        Self {
            sink: Arc::new(sink),
        }
    }

    /// An observer that prints each line to standard output.
    pub fn stdout() -> Self {
        Self::new(|line| println!("{}", line))
    }

    /// An observer that appends each line to the given buffer.
    pub fn collecting(lines: Arc<Mutex<Vec<String>>>) -> Self {
        Self::new(move |line| {
            if let Ok(mut lines) = lines.lock() {
                lines.push(line.to_string());
            }
        })
    }

    pub fn emit(&self, line: &str) {
        (self.sink)(line)
    }
}

impl Default for Observer {
    fn default() -> Self {
        Self::new(|line| log::info!("{}", line))
    }
}

impl fmt::Debug for Observer {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("Observer")
    }
}
