//! Minimal CLI parsing shared by the four binaries.
//!
//! Flags are parsed by hand; environment variables override the CLI
//! defaults so container deployments configure everything without wrapper
//! scripts.

use std::fmt::Display;
use std::str::FromStr;

/// Value of `name` from the environment, else `fallback`.
pub fn env_or<T>(name: &str, fallback: T) -> T
where
    T: FromStr + Display,
{
    match std::env::var(name) {
        Ok(raw) => raw.parse().unwrap_or_else(|_| {
            eprintln!("Ignoring unparsable {name}={raw}");
            std::process::exit(1);
        }),
        Err(_) => fallback,
    }
}

/// True when the env var is literally "true".
pub fn env_flag(name: &str) -> bool {
    std::env::var(name).map(|v| v == "true").unwrap_or(false)
}

/// Iterator-style argument cursor.
pub struct Args {
    args: Vec<String>,
    index: usize,
}

impl Args {
    pub fn from_env() -> Self {
        Self {
            args: std::env::args().collect(),
            index: 1,
        }
    }

    pub fn next(&mut self) -> Option<String> {
        let arg = self.args.get(self.index)?;
        self.index += 1;
        Some(arg.clone())
    }

    /// Value following a flag; exits with usage error when missing.
    pub fn value(&mut self, flag: &str) -> String {
        match self.next() {
            Some(value) => value,
            None => {
                eprintln!("Error: {flag} requires an argument");
                std::process::exit(1);
            }
        }
    }

    /// Parsed value following a flag.
    pub fn parse_value<T: FromStr>(&mut self, flag: &str) -> T {
        let raw = self.value(flag);
        raw.parse().unwrap_or_else(|_| {
            eprintln!("Error: invalid value for {flag}: {raw}");
            std::process::exit(1);
        })
    }
}
