use std::time::{Duration, Instant};
use crate::core::error::{Error, ErrorKind, Result};

/// Request deadline shared by every statement and shard task of one request.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    started: Instant,
    limit: Option<Duration>,
}

impl Deadline {
    pub fn new(limit: Option<Duration>) -> Self {
        Deadline { started: Instant::now(), limit }
    }

    pub fn unbounded() -> Self {
        Self::new(None)
    }

    pub fn expired(&self) -> bool {
        match self.limit {
            Some(limit) => self.started.elapsed() >= limit,
            None => false,
        }
    }

    pub fn remaining(&self) -> Option<Duration> {
        self.limit.map(|limit| limit.saturating_sub(self.started.elapsed()))
    }

    pub fn check(&self) -> Result<()> {
        if self.expired() {
            return Err(Error::new(
                ErrorKind::Timeout,
                format!("request exceeded its deadline of {:?}", self.limit.unwrap_or_default()),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unbounded_never_expires() {
        let deadline = Deadline::unbounded();
        assert!(!deadline.expired());
        assert!(deadline.check().is_ok());
        assert_eq!(deadline.remaining(), None);
    }

    #[test]
    fn zero_limit_expires_immediately() {
        let deadline = Deadline::new(Some(Duration::ZERO));
        let err = deadline.check().unwrap_err();
        assert_eq!(err.kind, ErrorKind::Timeout);
    }
}
