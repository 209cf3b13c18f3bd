//! Funnel arithmetic: distinct users per step, canonical ordering and the
//! conversion / drop-off metrics derived from them.
//!
//! Everything here is pure; the same input always gives the same funnel.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use crate::types::{EventRow, Funnel, FunnelStep, StepCount};

/// Count distinct users per step identifier.
///
/// Sorted by users descending, ties by identifier ascending.
pub fn aggregate_step_counts(rows: &[EventRow]) -> Vec<StepCount> {
    let mut users_by_step: BTreeMap<&str, HashSet<&str>> = BTreeMap::new();
    for row in rows {
        users_by_step
            .entry(row.event_category_ordered.as_str())
            .or_default()
            .insert(row.user_id.as_str());
    }

    let mut counts: Vec<StepCount> = users_by_step
        .into_iter()
        .map(|(step, users)| StepCount {
            event_category_ordered: step.to_string(),
            users: users.len() as u64,
        })
        .collect();

    // BTreeMap iteration is already identifier-ascending and sort_by is stable
    counts.sort_by(|a, b| b.users.cmp(&a.users));
    counts
}

/// Arrange step counts in canonical order and derive the metrics.
///
/// Canonical steps without data are skipped and observed steps outside the
/// canonical order are left out (see [`unrecognized_steps`]).
pub fn build_funnel<S: AsRef<str>>(
    step_counts: &[StepCount],
    canonical_order: &[S],
    step_prefix: &str,
) -> Funnel {
    let ordered: Vec<&StepCount> = canonical_order
        .iter()
        .filter_map(|step| {
            step_counts
                .iter()
                .find(|count| count.event_category_ordered == step.as_ref())
        })
        .collect();

    let Some(first) = ordered.first() else {
        return Funnel::NoData;
    };
    let baseline = first.users;

    let mut steps = Vec::with_capacity(ordered.len());
    let mut previous: Option<u64> = None;

    for (index, count) in ordered.iter().enumerate() {
        let conversion_rate = if index == 0 {
            100.0
        } else if baseline == 0 {
            0.0
        } else {
            round1(count.users as f64 / baseline as f64 * 100.0)
        };

        let (drop_off, drop_off_pct) = match previous {
            None => (0, 0.0),
            Some(prev) => {
                let drop_off = prev as i64 - count.users as i64;
                let pct = if prev == 0 {
                    0.0
                } else {
                    round1(drop_off as f64 / prev as f64 * 100.0)
                };
                (drop_off, pct)
            }
        };

        steps.push(FunnelStep {
            step_label: step_label(&count.event_category_ordered, step_prefix),
            event_category_ordered: count.event_category_ordered.clone(),
            users: count.users,
            conversion_rate,
            drop_off,
            drop_off_pct,
        });
        previous = Some(count.users);
    }

    Funnel::Steps(steps)
}

/// Observed identifiers that are not part of the canonical order, sorted.
pub fn unrecognized_steps<S: AsRef<str>>(
    step_counts: &[StepCount],
    canonical_order: &[S],
) -> Vec<String> {
    let canonical: HashSet<&str> = canonical_order.iter().map(AsRef::as_ref).collect();

    step_counts
        .iter()
        .map(|count| count.event_category_ordered.as_str())
        .filter(|step| !canonical.contains(step))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .map(str::to_string)
        .collect()
}

/// Display label for a step identifier.
///
/// `1.onboarding_pick_genres` with prefix `1.onboarding_` becomes
/// `Pick Genres`. Identifiers without the prefix are labelled whole.
pub fn step_label(identifier: &str, prefix: &str) -> String {
    let name = identifier.strip_prefix(prefix).unwrap_or(identifier);

    let mut label = String::with_capacity(name.len());
    let mut after_letter = false;
    for c in name.chars() {
        let c = if c == '_' { ' ' } else { c };
        if c.is_alphabetic() {
            if after_letter {
                label.extend(c.to_lowercase());
            } else {
                label.extend(c.to_uppercase());
            }
            after_letter = true;
        } else {
            label.push(c);
            after_letter = false;
        }
    }
    label
}

/// One decimal, ties to even.
fn round1(value: f64) -> f64 {
    (value * 10.0).round_ties_even() / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use lissen_config::{ONBOARDING_FUNNEL_STEPS, ONBOARDING_STEP_PREFIX};

    fn counts(pairs: &[(&str, u64)]) -> Vec<StepCount> {
        pairs
            .iter()
            .map(|(step, users)| StepCount {
                event_category_ordered: step.to_string(),
                users: *users,
            })
            .collect()
    }

    fn build(step_counts: &[StepCount]) -> Funnel {
        build_funnel(step_counts, &ONBOARDING_FUNNEL_STEPS, ONBOARDING_STEP_PREFIX)
    }

    #[test]
    fn test_aggregate_counts_distinct_users() {
        let rows = vec![
            EventRow::new("1.onboarding_main", "u1"),
            EventRow::new("1.onboarding_main", "u1"),
            EventRow::new("1.onboarding_main", "u2"),
            EventRow::new("1.onboarding_loading", "u1"),
        ];

        let result = aggregate_step_counts(&rows);

        assert_eq!(
            result,
            counts(&[("1.onboarding_main", 2), ("1.onboarding_loading", 1)])
        );
    }

    #[test]
    fn test_aggregate_orders_by_users_then_identifier() {
        let rows = vec![
            EventRow::new("b", "u1"),
            EventRow::new("a", "u1"),
            EventRow::new("c", "u1"),
            EventRow::new("c", "u2"),
        ];

        let result = aggregate_step_counts(&rows);

        assert_eq!(result, counts(&[("c", 2), ("a", 1), ("b", 1)]));
    }

    #[test]
    fn test_aggregate_empty_input() {
        assert!(aggregate_step_counts(&[]).is_empty());
    }

    #[test]
    fn test_worked_example() {
        let step_counts = counts(&[
            ("1.onboarding_main", 100),
            ("1.onboarding_loading", 80),
            ("1.onboarding_close", 20),
        ]);

        let funnel = build(&step_counts);
        let steps = funnel.steps();

        assert_eq!(steps.len(), 3);

        assert_eq!(steps[0].step_label, "Main");
        assert_eq!(steps[0].users, 100);
        assert_eq!(steps[0].conversion_rate, 100.0);
        assert_eq!(steps[0].drop_off, 0);
        assert_eq!(steps[0].drop_off_pct, 0.0);

        assert_eq!(steps[1].step_label, "Loading");
        assert_eq!(steps[1].users, 80);
        assert_eq!(steps[1].conversion_rate, 80.0);
        assert_eq!(steps[1].drop_off, 20);
        assert_eq!(steps[1].drop_off_pct, 20.0);

        assert_eq!(steps[2].step_label, "Close");
        assert_eq!(steps[2].event_category_ordered, "1.onboarding_close");
        assert_eq!(steps[2].users, 20);
        assert_eq!(steps[2].conversion_rate, 20.0);
        assert_eq!(steps[2].drop_off, 60);
        assert_eq!(steps[2].drop_off_pct, 75.0);
    }

    #[test]
    fn test_follows_canonical_order_not_input_order() {
        let step_counts = counts(&[
            ("1.onboarding_intro", 50),
            ("1.onboarding_close", 10),
            ("1.onboarding_main", 40),
        ]);

        let funnel = build(&step_counts);
        let labels: Vec<&str> = funnel.steps().iter().map(|s| s.step_label.as_str()).collect();

        assert_eq!(labels, vec!["Main", "Intro", "Close"]);
    }

    #[test]
    fn test_unknown_steps_are_dropped_and_reported() {
        let step_counts = counts(&[
            ("1.onboarding_main", 10),
            ("2.checkout_start", 99),
            ("1.onboarding_beta_flow", 3),
        ]);

        let funnel = build(&step_counts);
        assert_eq!(funnel.steps().len(), 1);
        assert_eq!(funnel.steps()[0].event_category_ordered, "1.onboarding_main");

        assert_eq!(
            unrecognized_steps(&step_counts, &ONBOARDING_FUNNEL_STEPS),
            vec!["1.onboarding_beta_flow", "2.checkout_start"]
        );
    }

    #[test]
    fn test_no_canonical_steps_is_no_data() {
        let step_counts = counts(&[("2.checkout_start", 5)]);

        assert_eq!(build(&step_counts), Funnel::NoData);
        assert_eq!(build(&[]), Funnel::NoData);
        assert!(!Funnel::NoData.has_data());
    }

    #[test]
    fn test_first_step_is_always_full_conversion() {
        let step_counts = counts(&[("1.onboarding_loading", 7), ("1.onboarding_intro", 3)]);

        let funnel = build(&step_counts);

        assert_eq!(funnel.steps()[0].step_label, "Loading");
        assert_eq!(funnel.steps()[0].conversion_rate, 100.0);
        assert_eq!(funnel.steps()[1].conversion_rate, 42.9);
    }

    #[test]
    fn test_negative_drop_off_is_kept() {
        let step_counts = counts(&[("1.onboarding_main", 10), ("1.onboarding_loading", 15)]);

        let funnel = build(&step_counts);
        let loading = &funnel.steps()[1];

        assert_eq!(loading.conversion_rate, 150.0);
        assert_eq!(loading.drop_off, -5);
        assert_eq!(loading.drop_off_pct, -50.0);
    }

    #[test]
    fn test_zero_previous_users_gives_zero_drop_off_pct() {
        let step_counts = counts(&[
            ("1.onboarding_main", 0),
            ("1.onboarding_loading", 0),
            ("1.onboarding_intro", 4),
        ]);

        let funnel = build(&step_counts);
        let steps = funnel.steps();

        assert_eq!(steps[0].conversion_rate, 100.0);
        assert_eq!(steps[1].conversion_rate, 0.0);
        assert_eq!(steps[1].drop_off_pct, 0.0);
        assert_eq!(steps[2].drop_off, -4);
        assert_eq!(steps[2].drop_off_pct, 0.0);
    }

    #[test]
    fn test_build_is_idempotent() {
        let step_counts = counts(&[
            ("1.onboarding_main", 1234),
            ("1.onboarding_pick_genres", 977),
            ("1.onboarding_link_streaming", 411),
        ]);

        assert_eq!(build(&step_counts), build(&step_counts));
    }

    #[test]
    fn test_round1_ties_to_even() {
        assert_eq!(round1(0.25), 0.2);
        assert_eq!(round1(0.35), 0.4);
        assert_eq!(round1(12.34), 12.3);
        assert_eq!(round1(-50.0), -50.0);
    }

    #[test]
    fn test_step_label() {
        let prefix = ONBOARDING_STEP_PREFIX;

        assert_eq!(step_label("1.onboarding_main", prefix), "Main");
        assert_eq!(step_label("1.onboarding_pick_genres", prefix), "Pick Genres");
        assert_eq!(
            step_label("1.onboarding_link_streaming", prefix),
            "Link Streaming"
        );
        assert_eq!(step_label("1.onboarding_PICK_ARTISTS", prefix), "Pick Artists");
        assert_eq!(step_label("signup_v2step", prefix), "Signup V2Step");
        assert_eq!(step_label("", prefix), "");
    }

    #[test]
    fn test_custom_canonical_order() {
        let order = vec!["welcome".to_string(), "done".to_string()];
        let step_counts = counts(&[("done", 2), ("welcome", 4)]);

        let funnel = build_funnel(&step_counts, &order, "");

        assert_eq!(funnel.steps()[0].step_label, "Welcome");
        assert_eq!(funnel.steps()[1].conversion_rate, 50.0);
    }
}
