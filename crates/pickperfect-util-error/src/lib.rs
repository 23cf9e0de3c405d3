use std::{error, fmt, result};

pub type BoxedError = Box<dyn error::Error + Send + Sync + 'static>;
pub type BoxedErrorResult<T> = result::Result<T, BoxedError>;

pub type WhateverResult<T> = result::Result<T, snafu::Whatever>;

/// Displays an error followed by its whole `source()` chain on one line.
pub struct FmtCompactError<'e, E: ?Sized>(pub &'e E);

impl<E> fmt::Display for FmtCompactError<'_, E>
where
    E: error::Error + ?Sized,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_fmt(format_args!("{}", self.0))?;

        let mut source = self.0.source();
        while let Some(err) = source {
            f.write_str(": ")?;
            f.write_fmt(format_args!("{err}"))?;
            source = err.source();
        }

        Ok(())
    }
}

pub struct FmtCompactResult<'r, O, E>(pub &'r result::Result<O, E>);

impl<O, E> fmt::Display for FmtCompactResult<'_, O, E>
where
    E: error::Error,
    O: fmt::Display,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Ok(o) => o.fmt(f),
            Err(e) => FmtCompactError(e).fmt(f),
        }
    }
}

pub trait FmtCompact {
    type Report: fmt::Display;
    fn fmt_compact(self) -> Self::Report;
}

impl<'e, E> FmtCompact for &'e E
where
    E: error::Error + ?Sized,
{
    type Report = FmtCompactError<'e, E>;

    fn fmt_compact(self) -> Self::Report {
        FmtCompactError(self)
    }
}

#[cfg(test)]
mod tests {
    use snafu::{ResultExt as _, Snafu};

    use super::*;

    #[derive(Debug, Snafu)]
    #[snafu(display("inner failure"))]
    struct Inner;

    #[derive(Debug, Snafu)]
    #[snafu(display("outer failure"))]
    struct Outer {
        source: Inner,
    }

    #[test]
    fn fmt_compact_walks_source_chain() {
        let err = Err::<(), _>(Inner).context(OuterSnafu).unwrap_err();
        assert_eq!(err.fmt_compact().to_string(), "outer failure: inner failure");
    }

    #[test]
    fn fmt_compact_result_prints_ok_value() {
        let ok: result::Result<u32, Inner> = Ok(7);
        assert_eq!(FmtCompactResult(&ok).to_string(), "7");
    }

    #[test]
    fn fmt_compact_works_on_boxed_errors() {
        let boxed: BoxedError = Box::new(Inner);
        assert_eq!(boxed.as_ref().fmt_compact().to_string(), "inner failure");
    }
}
