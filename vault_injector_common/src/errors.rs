//! Error-handling code.

use std::{backtrace::BacktraceStatus, fmt};

use anyhow::Error;

/// Support for displaying an error together with everything that caused it.
pub trait DisplayCausesExt {
    /// Display the error, one line per cause, followed by the backtrace if
    /// one was captured (see `RUST_BACKTRACE`).
    fn display_causes(&self) -> DisplayCauses<'_>;
}

impl DisplayCausesExt for Error {
    fn display_causes(&self) -> DisplayCauses<'_> {
        DisplayCauses(self)
    }
}

/// Helper type used to display errors.
pub struct DisplayCauses<'a>(&'a Error);

impl fmt::Display for DisplayCauses<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut chain = self.0.chain();
        if let Some(err) = chain.next() {
            writeln!(f, "ERROR: {}", err)?;
        }
        for cause in chain {
            writeln!(f, "  caused by: {}", cause)?;
        }

        let backtrace = self.0.backtrace();
        if backtrace.status() == BacktraceStatus::Captured {
            write!(f, "{}", backtrace)?;
        }
        Ok(())
    }
}

/// Generate a `main` function which calls the specified function. If the
/// function returns `Result::Err(_)`, then `main` will print the error and exit
/// with a non-zero status code.
#[macro_export]
macro_rules! quick_main {
    ($wrapped:ident) => {
        fn main() {
            if let Err(err) = $wrapped() {
                use $crate::errors::DisplayCausesExt;
                eprint!("{}", err.display_causes());
                ::std::process::exit(1);
            }
        }
    };
}

#[test]
fn display_causes_lists_every_cause() {
    use anyhow::Context as _;

    let err = Err::<(), _>(anyhow::format_err!("file is missing"))
        .context("could not load config")
        .unwrap_err();
    let shown = err.display_causes().to_string();
    assert!(
        shown.starts_with("ERROR: could not load config\n  caused by: file is missing\n"),
        "unexpected output: {}",
        shown,
    );
}
