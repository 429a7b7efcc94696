//! Comprehensive tests for the group runner.

#[cfg(test)]
mod tests {
    use crate::cancellation::RunToken;
    use crate::context::BindingTable;
    use crate::core::{RunReport, StageResult, StageStatus};
    use crate::credentials::CredentialStore;
    use crate::group::{GroupRunner, StageGroup};
    use crate::testing::MockStage;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;
    use std::sync::Arc;

    async fn run(
        group: &StageGroup,
        seed: HashMap<String, serde_json::Value>,
    ) -> (RunReport, HashMap<String, serde_json::Value>) {
        let store = CredentialStore::new();
        let token = RunToken::new();
        let runner = GroupRunner::new(&store, &token);
        let mut report = RunReport::new();
        let outputs = runner.run_root(group, seed, &mut report).await;
        (report, outputs)
    }

    #[tokio::test]
    async fn test_outputs_flow_between_siblings() {
        let producer = MockStage::new("producer").producing(&["value"]).returning(
            StageResult::pass().with_output("value", serde_json::json!(42)),
        );
        let consumer = Arc::new(MockStage::new("consumer").requiring(&["value"]));

        let group = StageGroup::new("root")
            .stage(producer)
            .stage_arc(consumer.clone());

        let (report, outputs) = run(&group, HashMap::new()).await;
        assert!(report.is_clean());
        assert_eq!(consumer.call_count(), 1);
        assert_eq!(
            consumer.seen_inputs()[0].get("value"),
            Some(&serde_json::json!(42))
        );
        assert_eq!(outputs.get("value"), Some(&serde_json::json!(42)));
    }

    #[tokio::test]
    async fn test_unbound_required_input_skips_stage_only() {
        let orphan = Arc::new(MockStage::new("orphan").requiring(&["never_bound"]));
        let sibling = Arc::new(MockStage::new("sibling"));

        let group = StageGroup::new("root")
            .stage_arc(orphan.clone())
            .stage_arc(sibling.clone());

        let (report, _) = run(&group, HashMap::new()).await;

        assert_eq!(orphan.call_count(), 0, "run must not be invoked");
        assert_eq!(sibling.call_count(), 1);
        let record = report.find("orphan").unwrap();
        assert_eq!(record.status, StageStatus::Skip);
        assert_eq!(record.unmet_dependency.as_deref(), Some("never_bound"));
        assert_eq!(report.status_of("sibling"), Some(StageStatus::Pass));
    }

    #[tokio::test]
    async fn test_failure_does_not_abort_plain_group() {
        let failing = MockStage::new("failing")
            .returning(StageResult::fail("server violated the rule"));
        let later = Arc::new(MockStage::new("later"));

        let group = StageGroup::new("root").stage(failing).stage_arc(later.clone());

        let (report, _) = run(&group, HashMap::new()).await;
        assert_eq!(later.call_count(), 1);
        assert_eq!(report.status_of("failing"), Some(StageStatus::Fail));
        assert_eq!(report.status_of("later"), Some(StageStatus::Pass));
    }

    #[tokio::test]
    async fn test_fail_fast_group_skips_remaining_children() {
        let failing = MockStage::new("authorization")
            .returning(StageResult::fail("authorization denied"));
        let later = Arc::new(MockStage::new("exchange"));

        let group = StageGroup::new("launch")
            .fail_fast()
            .stage(failing)
            .stage_arc(later.clone());

        let (report, _) = run(&group, HashMap::new()).await;
        assert_eq!(later.call_count(), 0);

        let record = report.find("exchange").unwrap();
        assert_eq!(record.status, StageStatus::Skip);
        assert!(record.message.as_deref().unwrap().contains("authorization"));
    }

    #[tokio::test]
    async fn test_fail_fast_subtree_does_not_stop_parent() {
        let inner = StageGroup::new("launch")
            .fail_fast()
            .stage(MockStage::new("authorization").returning(StageResult::fail("denied")));
        let after = Arc::new(MockStage::new("after"));

        let root = StageGroup::new("root").group(inner).stage_arc(after.clone());

        let (report, _) = run(&root, HashMap::new()).await;
        assert_eq!(after.call_count(), 1, "parent group is not fail-fast");
        assert_eq!(report.status_of("authorization"), Some(StageStatus::Fail));
    }

    #[tokio::test]
    async fn test_nested_group_bindings_rename_both_directions() {
        // Child group publishes `received_scopes`, bound upward to
        // `standalone_received_scopes`; a later sibling group reads it
        // back under its own local name.
        let producer_group = StageGroup::new("launch")
            .with_bindings(
                BindingTable::new()
                    .bind("received_scopes", "standalone_received_scopes")
                    .unwrap(),
            )
            .stage(
                MockStage::new("exchange")
                    .producing(&["received_scopes"])
                    .returning(StageResult::pass().with_output(
                        "received_scopes",
                        serde_json::json!("openid fhirUser"),
                    )),
            );

        let consumer = Arc::new(MockStage::new("refresh").requiring(&["received_scopes"]));
        let consumer_group = StageGroup::new("refresh_group")
            .with_bindings(
                BindingTable::new()
                    .bind("received_scopes", "standalone_received_scopes")
                    .unwrap(),
            )
            .stage_arc(consumer.clone());

        let root = StageGroup::new("root")
            .group(producer_group)
            .group(consumer_group);

        let (report, outputs) = run(&root, HashMap::new()).await;
        assert!(report.is_clean());
        assert_eq!(consumer.call_count(), 1);
        assert_eq!(
            consumer.seen_inputs()[0].get("received_scopes"),
            Some(&serde_json::json!("openid fhirUser"))
        );
        assert_eq!(
            outputs.get("standalone_received_scopes"),
            Some(&serde_json::json!("openid fhirUser"))
        );
    }

    #[tokio::test]
    async fn test_seed_values_visible_through_renaming() {
        let consumer = Arc::new(MockStage::new("stage").requiring(&["client_id"]));
        let inner = StageGroup::new("inner")
            .with_bindings(
                BindingTable::new()
                    .bind("client_id", "standalone_client_id")
                    .unwrap(),
            )
            .stage_arc(consumer.clone());
        let root = StageGroup::new("root").group(inner);

        let mut seed = HashMap::new();
        seed.insert(
            "standalone_client_id".to_string(),
            serde_json::json!("demo-app"),
        );

        let (report, _) = run(&root, seed).await;
        assert!(report.is_clean());
        assert_eq!(
            consumer.seen_inputs()[0].get("client_id"),
            Some(&serde_json::json!("demo-app"))
        );
    }

    #[tokio::test]
    async fn test_locked_input_wins_over_stage_output() {
        let writer = MockStage::new("writer").producing(&["use_pkce"]).returning(
            StageResult::pass().with_output("use_pkce", serde_json::json!("false")),
        );
        let reader = Arc::new(MockStage::new("reader").requiring(&["use_pkce"]));

        let group = StageGroup::new("stu2_launch")
            .lock_input("use_pkce", serde_json::json!("true"))
            .stage(writer)
            .stage_arc(reader.clone());
        let root = StageGroup::new("root").group(group);

        let (_, _) = run(&root, HashMap::new()).await;
        assert_eq!(
            reader.seen_inputs()[0].get("use_pkce"),
            Some(&serde_json::json!("true"))
        );
    }

    #[tokio::test]
    async fn test_error_status_counts_for_fail_fast() {
        let erroring = MockStage::new("exchange")
            .returning(StageResult::error("token endpoint timed out"));
        let later = Arc::new(MockStage::new("later"));

        let group = StageGroup::new("launch")
            .fail_fast()
            .stage(erroring)
            .stage_arc(later.clone());

        let (report, _) = run(&group, HashMap::new()).await;
        assert_eq!(later.call_count(), 0);
        assert_eq!(report.status_of("exchange"), Some(StageStatus::Error));
    }

    #[tokio::test]
    async fn test_cancellation_stops_the_run_and_discards_context() {
        let store = CredentialStore::new();
        let token = RunToken::new();
        token.cancel("user aborted");

        let stage = Arc::new(MockStage::new("never"));
        let group = StageGroup::new("root").stage_arc(stage.clone());

        let runner = GroupRunner::new(&store, &token);
        let mut report = RunReport::new();
        let outputs = runner.run_root(&group, HashMap::new(), &mut report).await;

        assert_eq!(stage.call_count(), 0);
        assert!(report.is_empty());
        assert!(outputs.is_empty());
    }

    #[tokio::test]
    async fn test_every_child_is_recorded() {
        let group = StageGroup::new("root")
            .stage(MockStage::new("one"))
            .stage(MockStage::new("two").returning(StageResult::fail("nope")))
            .stage(MockStage::new("three").requiring(&["missing"]));

        let (report, _) = run(&group, HashMap::new()).await;
        assert_eq!(report.len(), 3);
        assert_eq!(report.find_path("root/one").unwrap().status, StageStatus::Pass);
        assert_eq!(report.find_path("root/two").unwrap().status, StageStatus::Fail);
        assert_eq!(report.find_path("root/three").unwrap().status, StageStatus::Skip);
    }
}
