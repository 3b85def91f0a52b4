//! Tests for dispatcher slot selection and event validation

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Duration, Utc};

    use crate::config::test_fixtures::sample_config;
    use crate::dispatcher::{find_optimal_slot, validate_event, DispatchEvent};
    use crate::error::Error;
    use crate::metadata::{RawMetadata, ResolvedMetadata};
    use crate::planner::schedule::{Schedule, ScheduleMetadata, SlotRecommendation};

    fn at(s: &str) -> DateTime<Utc> {
        s.parse().unwrap()
    }

    /// 24 hourly slots from 2025-12-10 13:00 to 2025-12-11 12:00.
    /// Each slot's region is REGION-<priority>, so the earliest slot is
    /// REGION-10, the 16:00 slot REGION-7, 19:00 REGION-2 (priority 2),
    /// 22:00 REGION-1 (priority 1) and the final slot REGION-24.
    fn test_schedule() -> Schedule {
        let start = at("2025-12-10T13:00:00Z");
        let mut pool: Vec<u32> = (1..=24)
            .filter(|p| ![10, 7, 2, 1, 24].contains(p))
            .collect();
        pool.reverse();

        let mut recommendations = Vec::new();
        for i in 0..24 {
            let priority = match i {
                0 => 10,
                3 => 7,
                6 => 2,
                9 => 1,
                23 => 24,
                _ => pool.pop().unwrap(),
            };
            let dt = start + Duration::hours(i);
            recommendations.push(SlotRecommendation {
                datetime: dt.format("%Y-%m-%d %H:%M").to_string(),
                region: format!("REGION-{}", priority),
                carbon_intensity: 50 + priority as i64,
                transfer_cost_usd: 0.01,
                emissions_grams: 0.5,
                priority,
                reasoning: "fixture".to_string(),
                function_url: Some("function.test".to_string()),
            });
        }

        let config = sample_config();
        let metadata =
            ResolvedMetadata::resolve("dummy", RawMetadata::default(), &config.agent_defaults);
        let hash = metadata.metadata_hash();
        Schedule {
            recommendations,
            metadata: ScheduleMetadata {
                generated_at: Utc::now(),
                created_at: Utc::now(),
                metadata_hash: hash,
                function_metadata: metadata,
                regions_used: vec![],
                failed_regions: vec![],
            },
            deployment: None,
        }
    }

    struct Case {
        now: &'static str,
        deadline: Option<&'static str>,
        delay_disabled: bool,
        expect_delayed: bool,
        expect_time: &'static str,
        expect_region: &'static str,
    }

    fn run(case: &Case) {
        let schedule = test_schedule();
        let selection = find_optimal_slot(
            &schedule,
            case.deadline.map(at),
            case.delay_disabled,
            at(case.now),
        )
        .unwrap();

        assert_eq!(selection.delayed, case.expect_delayed, "delay for {:?}", case.now);
        assert_eq!(selection.target_time, at(case.expect_time));
        assert_eq!(selection.region, case.expect_region);
        assert_eq!(selection.function_url.as_deref(), Some("function.test"));
    }

    #[test]
    fn before_schedule_immediate_uses_earliest_region() {
        run(&Case {
            now: "2025-12-05T00:00:00Z",
            deadline: None,
            delay_disabled: true,
            expect_delayed: false,
            expect_time: "2025-12-05T00:00:00Z",
            expect_region: "REGION-10",
        });
    }

    #[test]
    fn before_schedule_past_deadline_executes_immediately() {
        run(&Case {
            now: "2025-12-05T00:00:00Z",
            deadline: Some("2025-12-04T12:00:00Z"),
            delay_disabled: false,
            expect_delayed: false,
            expect_time: "2025-12-05T00:00:00Z",
            expect_region: "REGION-10",
        });
    }

    #[test]
    fn deadline_before_earliest_slot_takes_earliest_at_deadline() {
        run(&Case {
            now: "2025-12-05T00:00:00Z",
            deadline: Some("2025-12-06T12:00:00Z"),
            delay_disabled: false,
            expect_delayed: true,
            expect_time: "2025-12-06T12:00:00Z",
            expect_region: "REGION-10",
        });
    }

    #[test]
    fn deadline_after_all_slots_finds_best_priority() {
        run(&Case {
            now: "2025-12-05T00:00:00Z",
            deadline: Some("2025-12-13T12:00:00Z"),
            delay_disabled: false,
            expect_delayed: true,
            expect_time: "2025-12-10T22:00:00Z",
            expect_region: "REGION-1",
        });
    }

    #[test]
    fn deadline_between_slots_excludes_later_better_slot() {
        run(&Case {
            now: "2025-12-05T00:00:00Z",
            deadline: Some("2025-12-10T21:00:00Z"),
            delay_disabled: false,
            expect_delayed: true,
            expect_time: "2025-12-10T19:00:00Z",
            expect_region: "REGION-2",
        });
    }

    #[test]
    fn mid_schedule_immediate_uses_current_hour_region() {
        run(&Case {
            now: "2025-12-10T16:35:00Z",
            deadline: None,
            delay_disabled: true,
            expect_delayed: false,
            expect_time: "2025-12-10T16:00:00Z",
            expect_region: "REGION-7",
        });
    }

    #[test]
    fn mid_schedule_past_deadline_executes_in_current_hour_region() {
        run(&Case {
            now: "2025-12-10T16:35:00Z",
            deadline: Some("2025-12-09T12:00:00Z"),
            delay_disabled: false,
            expect_delayed: false,
            expect_time: "2025-12-10T16:00:00Z",
            expect_region: "REGION-7",
        });
    }

    #[test]
    fn mid_schedule_generous_deadline_waits_for_best_slot() {
        run(&Case {
            now: "2025-12-10T16:35:00Z",
            deadline: Some("2025-12-13T12:00:00Z"),
            delay_disabled: false,
            expect_delayed: true,
            expect_time: "2025-12-10T22:00:00Z",
            expect_region: "REGION-1",
        });
    }

    #[test]
    fn mid_schedule_tight_deadline_takes_best_reachable_slot() {
        run(&Case {
            now: "2025-12-10T16:35:00Z",
            deadline: Some("2025-12-10T21:00:00Z"),
            delay_disabled: false,
            expect_delayed: true,
            expect_time: "2025-12-10T19:00:00Z",
            expect_region: "REGION-2",
        });
    }

    #[test]
    fn after_schedule_immediate_uses_last_region() {
        run(&Case {
            now: "2025-12-13T16:35:00Z",
            deadline: None,
            delay_disabled: true,
            expect_delayed: false,
            expect_time: "2025-12-13T16:00:00Z",
            expect_region: "REGION-24",
        });
    }

    #[test]
    fn after_schedule_future_deadline_runs_last_region_at_deadline_hour() {
        run(&Case {
            now: "2025-12-13T16:35:00Z",
            deadline: Some("2025-12-14T12:45:00Z"),
            delay_disabled: false,
            expect_delayed: true,
            expect_time: "2025-12-14T12:00:00Z",
            expect_region: "REGION-24",
        });
    }

    #[test]
    fn after_schedule_past_deadline_executes_immediately() {
        run(&Case {
            now: "2025-12-13T16:35:00Z",
            deadline: Some("2025-12-10T21:00:00Z"),
            delay_disabled: false,
            expect_delayed: false,
            expect_time: "2025-12-13T16:00:00Z",
            expect_region: "REGION-24",
        });
    }

    #[test]
    fn immediate_selection_reports_priority_zero() {
        let schedule = test_schedule();
        let selection =
            find_optimal_slot(&schedule, None, true, at("2025-12-10T16:35:00Z")).unwrap();
        assert_eq!(selection.priority, 0);
    }

    #[test]
    fn selection_is_deterministic() {
        let schedule = test_schedule();
        let now = at("2025-12-10T16:35:00Z");
        let deadline = Some(at("2025-12-10T21:00:00Z"));
        let first = find_optimal_slot(&schedule, deadline, false, now).unwrap();
        let second = find_optimal_slot(&schedule, deadline, false, now).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn missing_function_name_is_rejected() {
        let err = validate_event(&DispatchEvent::default()).unwrap_err();
        assert!(matches!(err, Error::Dispatch(_)));
    }

    #[test]
    fn invalid_delay_value_is_rejected() {
        let event = DispatchEvent {
            function_name: Some("demo".into()),
            delay: Some("maybe".into()),
            ..Default::default()
        };
        assert!(matches!(
            validate_event(&event).unwrap_err(),
            Error::Dispatch(_)
        ));
    }

    #[test]
    fn deadline_required_when_delay_allowed() {
        let event = DispatchEvent {
            function_name: Some("demo".into()),
            ..Default::default()
        };
        assert!(validate_event(&event).is_err());

        let event = DispatchEvent {
            function_name: Some("demo".into()),
            delay: Some("false".into()),
            ..Default::default()
        };
        let (_, delay_disabled, deadline) = validate_event(&event).unwrap();
        assert!(delay_disabled);
        assert!(deadline.is_none());
    }

    #[test]
    fn delay_false_wins_over_deadline() {
        let event = DispatchEvent {
            function_name: Some("demo".into()),
            delay: Some("false".into()),
            deadline: Some("2025-12-14T12:00:00Z".into()),
            ..Default::default()
        };
        let (_, delay_disabled, deadline) = validate_event(&event).unwrap();
        assert!(delay_disabled);
        assert!(deadline.is_none());
    }

    #[test]
    fn naive_deadline_is_interpreted_as_utc() {
        let event = DispatchEvent {
            function_name: Some("demo".into()),
            deadline: Some("2025-12-01T20:01:00".into()),
            ..Default::default()
        };
        let (_, _, deadline) = validate_event(&event).unwrap();
        assert_eq!(deadline.unwrap(), at("2025-12-01T20:01:00Z"));
    }
}
