use rand::Rng;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::lawyer::{Lawyer, LawyerId};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AssignmentReason {
    SeniorTier,
    LeastLoaded,
}

impl AssignmentReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SeniorTier => "senior_tier",
            Self::LeastLoaded => "least_loaded",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Assignment {
    pub lawyer: Lawyer,
    pub reason: AssignmentReason,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AssignmentPolicy {
    pub high_value_threshold: Decimal,
    pub senior_lawyer_id: LawyerId,
    /// How many of the least loaded lawyers are eligible for the random pick.
    pub window: usize,
}

impl Default for AssignmentPolicy {
    fn default() -> Self {
        Self {
            high_value_threshold: Decimal::new(50_000, 0),
            senior_lawyer_id: LawyerId("A01".to_string()),
            window: 3,
        }
    }
}

impl AssignmentPolicy {
    pub fn select<R>(
        &self,
        roster: &[Lawyer],
        monthly_salary: Option<Decimal>,
        rng: &mut R,
    ) -> Option<Assignment>
    where
        R: Rng,
    {
        let high_value =
            monthly_salary.is_some_and(|salary| salary >= self.high_value_threshold);
        if high_value {
            let senior =
                roster.iter().find(|lawyer| lawyer.active && lawyer.id == self.senior_lawyer_id);
            if let Some(senior) = senior {
                return Some(Assignment {
                    lawyer: senior.clone(),
                    reason: AssignmentReason::SeniorTier,
                });
            }
        }

        let mut candidates: Vec<&Lawyer> = roster.iter().filter(|lawyer| lawyer.active).collect();
        if candidates.is_empty() {
            return None;
        }
        candidates.sort_by(|left, right| {
            left.daily_load.cmp(&right.daily_load).then_with(|| left.id.cmp(&right.id))
        });
        candidates.truncate(self.window.max(1));

        let picked = candidates[rng.gen_range(0..candidates.len())];
        Some(Assignment { lawyer: picked.clone(), reason: AssignmentReason::LeastLoaded })
    }
}
