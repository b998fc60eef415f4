//! Membership points and tiers. The tier is always recomputed from the
//! points counter; nothing ever stores it.

/// Awarded for a top-level comment. Replies award nothing.
pub const COMMENT_AWARD: i64 = 10;

/// Awarded by the reading-history collaborator when a chapter is read.
pub const CHAPTER_READ_AWARD: i64 = 5;

pub const SILVER_THRESHOLD: i64 = 500;
pub const GOLD_THRESHOLD: i64 = 2000;
pub const DIAMOND_THRESHOLD: i64 = 5000;

#[derive(Clone, Copy, Debug, Eq, Ord, PartialEq, PartialOrd, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Bronze,
    Silver,
    Gold,
    Diamond,
}

impl Tier {
    pub fn for_points(points: i64) -> Tier {
        if points >= DIAMOND_THRESHOLD {
            Tier::Diamond
        } else if points >= GOLD_THRESHOLD {
            Tier::Gold
        } else if points >= SILVER_THRESHOLD {
            Tier::Silver
        } else {
            Tier::Bronze
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Bronze => "bronze",
            Tier::Silver => "silver",
            Tier::Gold => "gold",
            Tier::Diamond => "diamond",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thresholds() {
        assert_eq!(Tier::for_points(0), Tier::Bronze);
        assert_eq!(Tier::for_points(499), Tier::Bronze);
        assert_eq!(Tier::for_points(500), Tier::Silver);
        assert_eq!(Tier::for_points(1999), Tier::Silver);
        assert_eq!(Tier::for_points(2000), Tier::Gold);
        assert_eq!(Tier::for_points(4999), Tier::Gold);
        assert_eq!(Tier::for_points(5000), Tier::Diamond);
        assert_eq!(Tier::for_points(1_000_000), Tier::Diamond);
    }

    #[test]
    fn tier_is_monotonic_in_points() {
        let mut points = 0;
        let mut last = Tier::for_points(points);
        while points < 6000 {
            points += COMMENT_AWARD;
            let now = Tier::for_points(points);
            assert!(now >= last);
            last = now;
        }
        assert_eq!(last, Tier::Diamond);
    }
}
