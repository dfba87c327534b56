//! Improvement cadence
//!
//! Two ways to say when the Wizard should rewrite its prompt:
//! - `Periodic(n)`: after conversations n, 2n, 3n, ...
//! - `ExplicitPoints`: after exactly the listed conversation counts
//!
//! Textual form (used by configuration): a bare integer is periodic, a list
//! separated by `;` or `,` is explicit. A single explicit point is written
//! with a trailing separator, e.g. `5;`.

use std::collections::BTreeSet;
use std::fmt;
use std::num::NonZeroUsize;
use std::str::FromStr;
use thiserror::Error;

const SEPARATORS: &[char] = &[';', ','];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ScheduleError {
    #[error("improvement period must be at least 1")]
    ZeroPeriod,
    #[error("explicit improvement points must be at least 1, got 0")]
    ZeroPoint,
    #[error("explicit improvement schedule is empty")]
    Empty,
    #[error("invalid improvement schedule '{0}'")]
    Invalid(String),
}

/// When an improvement cycle runs, as a function of the conversation count
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImprovementSchedule {
    Periodic(NonZeroUsize),
    ExplicitPoints(BTreeSet<usize>),
}

impl ImprovementSchedule {
    pub fn periodic(n: usize) -> Result<Self, ScheduleError> {
        NonZeroUsize::new(n)
            .map(ImprovementSchedule::Periodic)
            .ok_or(ScheduleError::ZeroPeriod)
    }

    pub fn explicit(points: impl IntoIterator<Item = usize>) -> Result<Self, ScheduleError> {
        let points: BTreeSet<usize> = points.into_iter().collect();
        if points.is_empty() {
            return Err(ScheduleError::Empty);
        }
        if points.contains(&0) {
            return Err(ScheduleError::ZeroPoint);
        }
        Ok(ImprovementSchedule::ExplicitPoints(points))
    }

    /// Should an improvement cycle run after `conversation_count` conversations?
    pub fn should_improve(&self, conversation_count: usize) -> bool {
        match self {
            ImprovementSchedule::Periodic(n) => {
                conversation_count > 0 && conversation_count % n.get() == 0
            }
            ImprovementSchedule::ExplicitPoints(points) => points.contains(&conversation_count),
        }
    }

    /// Last scheduled point (the period itself for periodic schedules)
    pub fn last_point(&self) -> usize {
        match self {
            ImprovementSchedule::Periodic(n) => n.get(),
            ImprovementSchedule::ExplicitPoints(points) => {
                points.iter().next_back().copied().unwrap_or_default()
            }
        }
    }
}

impl FromStr for ImprovementSchedule {
    type Err = ScheduleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if !s.contains(SEPARATORS) {
            let n = s
                .parse::<usize>()
                .map_err(|_| ScheduleError::Invalid(s.to_string()))?;
            return ImprovementSchedule::periodic(n);
        }

        let points = s
            .split(SEPARATORS)
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(|p| {
                p.parse::<usize>()
                    .map_err(|_| ScheduleError::Invalid(s.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        ImprovementSchedule::explicit(points)
    }
}

impl fmt::Display for ImprovementSchedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImprovementSchedule::Periodic(n) => write!(f, "every {} conversations", n),
            ImprovementSchedule::ExplicitPoints(points) => {
                let list: Vec<String> = points.iter().map(|p| p.to_string()).collect();
                write!(f, "after conversations {}", list.join(";"))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_periodic_triggers_on_multiples_only() {
        let schedule = ImprovementSchedule::periodic(5).unwrap();
        let fired: Vec<usize> = (0..=22).filter(|c| schedule.should_improve(*c)).collect();
        assert_eq!(fired, vec![5, 10, 15, 20]);
    }

    #[test]
    fn test_explicit_triggers_on_listed_points() {
        let schedule = ImprovementSchedule::explicit([1, 5, 36]).unwrap();
        let fired: Vec<usize> = (0..=40).filter(|c| schedule.should_improve(*c)).collect();
        assert_eq!(fired, vec![1, 5, 36]);
        assert_eq!(schedule.last_point(), 36);
    }

    #[test]
    fn test_parse() {
        assert_eq!(
            "10".parse::<ImprovementSchedule>().unwrap(),
            ImprovementSchedule::periodic(10).unwrap()
        );
        assert_eq!(
            "1;5;36".parse::<ImprovementSchedule>().unwrap(),
            ImprovementSchedule::explicit([1, 5, 36]).unwrap()
        );
        assert_eq!(
            " 36, 1 ,5 ".parse::<ImprovementSchedule>().unwrap(),
            ImprovementSchedule::explicit([1, 5, 36]).unwrap()
        );
        assert_eq!(
            "5;".parse::<ImprovementSchedule>().unwrap(),
            ImprovementSchedule::explicit([5]).unwrap()
        );
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!("0".parse::<ImprovementSchedule>(), Err(ScheduleError::ZeroPeriod));
        assert_eq!("0;4".parse::<ImprovementSchedule>(), Err(ScheduleError::ZeroPoint));
        assert_eq!(";".parse::<ImprovementSchedule>(), Err(ScheduleError::Empty));
        assert!(matches!(
            "often".parse::<ImprovementSchedule>(),
            Err(ScheduleError::Invalid(_))
        ));
    }
}
