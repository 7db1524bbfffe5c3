// tests/decision_thresholds.rs
//
// Threshold boundaries of the decision step, plus a seeded sweep showing
// `decide` is a pure function of the score.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use news_curator::decision::{decide, DecisionPolicy, Recommendation};
use news_curator::score::{JudgmentScore, Stage};

fn total_of(u: i64, i: i64, r: i64) -> Recommendation {
    decide(&JudgmentScore::new(u, i, r, 3).unwrap()).recommendation
}

#[test]
fn boundaries_follow_default_policy() {
    assert_eq!(total_of(8, 8, 8), Recommendation::Mid); // 24
    assert_eq!(total_of(8, 8, 9), Recommendation::High); // 25
    assert_eq!(total_of(10, 10, 10), Recommendation::High); // 30
    assert_eq!(total_of(0, 0, 0), Recommendation::Low); // 0
    assert_eq!(total_of(5, 5, 5), Recommendation::Mid); // 15
    assert_eq!(total_of(5, 5, 4), Recommendation::Low); // 14
}

#[test]
fn credibility_is_carried_not_scored() {
    let lo = decide(&JudgmentScore::new(8, 8, 9, 0).unwrap());
    let hi = decide(&JudgmentScore::new(8, 8, 9, 5).unwrap());
    assert_eq!(lo.recommendation, hi.recommendation);
    assert_eq!(lo.total, 25);
    assert_eq!(lo.credibility, 0);
    assert_eq!(hi.credibility, 5);
}

#[test]
fn raised_high_threshold_moves_the_boundary() {
    let p = DecisionPolicy {
        high_threshold: 27,
        ..DecisionPolicy::default()
    };
    let s = JudgmentScore::new(8, 8, 9, 3).unwrap();
    assert_eq!(p.decide(&s).recommendation, Recommendation::Mid);
    let s = JudgmentScore::new(9, 9, 9, 3).unwrap();
    assert_eq!(p.decide(&s).recommendation, Recommendation::High);
}

#[test]
fn floor_is_strictly_below() {
    let p = DecisionPolicy::default();
    assert!(p.is_below_floor(&JudgmentScore::new(3, 3, 3, 1).unwrap()));
    assert!(!p.is_below_floor(&JudgmentScore::new(3, 3, 4, 1).unwrap()));
}

#[test]
fn seeded_sweep_is_deterministic_and_matches_rule() {
    let mut rng = StdRng::seed_from_u64(0x5eed);
    let policy = DecisionPolicy::default();
    for _ in 0..1_000 {
        let s = JudgmentScore::new(
            rng.random_range(0..=10),
            rng.random_range(0..=10),
            rng.random_range(0..=10),
            rng.random_range(0..=5),
        )
        .unwrap();
        let a = policy.decide(&s);
        let b = policy.decide(&s);
        assert_eq!(a, b);

        let total = s.uniqueness() + s.impact() + s.urgency();
        assert_eq!(a.total, total);
        let expected = match total {
            25..=30 => Recommendation::High,
            15..=24 => Recommendation::Mid,
            _ => Recommendation::Low,
        };
        assert_eq!(a.recommendation, expected, "total={total}");
        assert_eq!(a.basis, Stage::Stage1);
    }
}
