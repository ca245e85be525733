use std::fmt;
use std::str::FromStr;

/// Final outcome code for a submission.
///
/// A job's `status` column holds either a queue state (`waiting`, `pending`)
/// or one of these terminal codes. Once a terminal code is written it is
/// never overwritten.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Accepted,
    WrongAnswer,
    TimeLimitExceeded,
    MemoryLimitExceeded,
    RuntimeError,
    CompileError,
    InternalError,
}

impl Verdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Accepted => "AC",
            Self::WrongAnswer => "WA",
            Self::TimeLimitExceeded => "TLE",
            Self::MemoryLimitExceeded => "MLE",
            Self::RuntimeError => "RE",
            Self::CompileError => "CE",
            Self::InternalError => "IE",
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Verdict {
    type Err = ();

    /// Only the seven terminal codes parse; queue states and anything a
    /// malformed harness may emit are rejected by the caller (mapped to IE).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "AC" => Ok(Self::Accepted),
            "WA" => Ok(Self::WrongAnswer),
            "TLE" => Ok(Self::TimeLimitExceeded),
            "MLE" => Ok(Self::MemoryLimitExceeded),
            "RE" => Ok(Self::RuntimeError),
            "CE" => Ok(Self::CompileError),
            "IE" => Ok(Self::InternalError),
            _ => Err(()),
        }
    }
}

/// Queue state of a job before it reaches a verdict.
pub const STATUS_WAITING: &str = "waiting";
pub const STATUS_PENDING: &str = "pending";
