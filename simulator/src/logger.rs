use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

use prelude::float;

/// Plain-text trajectory log, one `tag timestep values...` record per line.
pub struct Logger {
    out: Option<BufWriter<File>>,
}

impl Logger {
    pub fn disabled() -> Logger {
        Logger { out: None }
    }

    pub fn create(path: &str) -> Logger {
        if let Some(dir) = Path::new(path).parent() {
            fs::create_dir_all(dir).unwrap_or_else(|e| panic!("unable to create {:?}: {}", dir, e));
        }
        let file = File::create(path).unwrap_or_else(|e| panic!("unable to create {}: {}", path, e));
        Logger {
            out: Some(BufWriter::new(file)),
        }
    }

    pub fn record<I>(&mut self, tag: &str, t: i64, values: I)
    where
        I: IntoIterator<Item = float>,
    {
        if let Some(out) = &mut self.out {
            write!(out, "{} {}", tag, t).expect("log write failed");
            for v in values {
                write!(out, " {}", v).expect("log write failed");
            }
            writeln!(out).expect("log write failed");
        }
    }

    pub fn close(&mut self) {
        if let Some(mut out) = self.out.take() {
            let _ = out.flush();
        }
    }
}

impl Drop for Logger {
    fn drop(&mut self) {
        self.close();
    }
}
