use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::json;

use crate::backends::stub::{StubBlob, StubCompletion};
use crate::blob::{BlobDrainData, Token};
use crate::config::{DeadlockPolicy, DrainDataDelivery, DrainerOptions};
use crate::engine::{BlobGraph, DrainKind, DrainMode, Drainer, DrainerState, NodeDrainState};
use crate::errors::DrainError;
use crate::observability::DrainDataStatistics;
use crate::traits::{Blob, DrainerHooks};

/// Integration tests for whole draining episodes over simulated blobs
#[cfg(test)]
mod tests {
    use super::*;

    const WAIT: Duration = Duration::from_secs(5);

    #[derive(Default)]
    struct RecordingHooks {
        prepared: Mutex<Vec<bool>>,
        notified: Mutex<Vec<(Token, bool)>>,
        completed: Mutex<Vec<bool>>,
        fail_prepare: bool,
    }

    impl RecordingHooks {
        fn notified_blobs(&self) -> Vec<Token> {
            self.notified.lock().unwrap().iter().map(|(blob, _)| *blob).collect()
        }
    }

    impl DrainerHooks for RecordingHooks {
        fn prepare_draining(&self, is_final: bool) -> anyhow::Result<()> {
            self.prepared.lock().unwrap().push(is_final);
            if self.fail_prepare {
                anyhow::bail!("tail buffer unavailable");
            }
            Ok(())
        }

        fn drain_notify(&self, blob: Token, is_final: bool) {
            self.notified.lock().unwrap().push((blob, is_final));
        }

        fn episode_complete(&self, is_final: bool) {
            self.completed.lock().unwrap().push(is_final);
        }
    }

    /// input->0 | 0->1 | 1->2 | ... | (n-1)->output, one blob per stage.
    fn chain(stages: u32) -> Vec<Arc<StubBlob>> {
        (0..stages)
            .map(|stage| {
                let input = if stage == 0 {
                    Token::overall_input(0)
                } else {
                    Token::new(stage - 1, stage)
                };
                let output = if stage + 1 == stages {
                    Token::overall_output(stage)
                } else {
                    Token::new(stage, stage + 1)
                };
                Arc::new(StubBlob::new([input], [output]))
            })
            .collect()
    }

    fn drainer_for(
        blobs: &[Arc<StubBlob>],
        hooks: Arc<RecordingHooks>,
        options: DrainerOptions,
    ) -> Drainer {
        let blobs: Vec<Arc<dyn Blob>> = blobs.iter().map(|blob| blob.clone() as Arc<dyn Blob>).collect();
        let graph = BlobGraph::from_blobs(&blobs).unwrap();
        Drainer::builder(graph)
            .blobs(blobs)
            .hooks(hooks)
            .options(options)
            .build()
            .unwrap()
    }

    fn deadlock_options(timeout_ms: u64) -> DrainerOptions {
        DrainerOptions {
            deadlock_timeout_ms: Some(timeout_ms),
            ..DrainerOptions::default()
        }
    }

    async fn within<F: std::future::Future>(future: F) -> F::Output {
        tokio::time::timeout(WAIT, future)
            .await
            .expect("draining did not finish in time")
    }

    #[tokio::test]
    async fn test_final_drain_of_chain_runs_in_topological_order() {
        let blobs = chain(3);
        for blob in &blobs {
            blob.hold_completion();
        }
        let hooks = Arc::new(RecordingHooks::default());
        let drainer = drainer_for(&blobs, hooks.clone(), DrainerOptions::default());

        assert!(!drainer.is_drained());
        assert!(drainer.start_draining(DrainMode::Final).unwrap());
        let calls = || blobs.iter().map(|blob| blob.drain_calls()).collect::<Vec<_>>();
        assert_eq!(calls(), vec![1, 0, 0]);

        assert!(blobs[0].release_completion().unwrap());
        assert_eq!(calls(), vec![1, 1, 0]);
        assert!(blobs[1].release_completion().unwrap());
        assert_eq!(calls(), vec![1, 1, 1]);
        assert!(!drainer.is_drained());
        assert!(blobs[2].release_completion().unwrap());
        within(drainer.await_final_drained()).await;

        assert!(drainer.is_drained());
        assert_eq!(drainer.state(), DrainerState::Final);
        let ids: Vec<Token> = blobs.iter().map(|blob| blob.id().unwrap()).collect();
        assert_eq!(hooks.notified_blobs(), ids);
        assert_eq!(*hooks.prepared.lock().unwrap(), vec![true]);
        assert_eq!(*hooks.completed.lock().unwrap(), vec![true]);
        for blob in &blobs {
            assert_eq!(blob.drain_kinds(), vec![DrainKind::Final]);
        }
    }

    #[tokio::test]
    async fn test_immediate_completions_are_reported_in_graph_order() {
        let blobs = chain(4);
        let hooks = Arc::new(RecordingHooks::default());
        let drainer = drainer_for(&blobs, hooks.clone(), DrainerOptions::default());

        assert!(drainer.start_draining(DrainMode::Final).unwrap());

        assert!(drainer.is_drained());
        let ids: Vec<Token> = blobs.iter().map(|blob| blob.id().unwrap()).collect();
        assert_eq!(hooks.notified_blobs(), ids);
    }

    #[tokio::test]
    async fn test_diamond_join_waits_for_both_branches() {
        let input = Token::overall_input(0);
        let (left_in, right_in) = (Token::new(0, 1), Token::new(0, 2));
        let (left_out, right_out) = (Token::new(1, 3), Token::new(2, 3));
        let source = Arc::new(StubBlob::new([input], [left_in, right_in]));
        let left = Arc::new(StubBlob::new([left_in], [left_out]));
        let right = Arc::new(StubBlob::new([right_in], [right_out]));
        let join = Arc::new(StubBlob::new([left_out, right_out], [Token::overall_output(3)]));
        left.hold_completion();

        let hooks = Arc::new(RecordingHooks::default());
        let drainer = drainer_for(
            &[source.clone(), left.clone(), right.clone(), join.clone()],
            hooks.clone(),
            DrainerOptions::default(),
        );

        assert!(drainer.start_draining(DrainMode::Intermediate).unwrap());
        assert_eq!(right.drain_calls(), 1);
        assert_eq!(join.drain_calls(), 0);
        assert_eq!(
            drainer.graph().node(left_out).unwrap().dependency_count(),
            1
        );

        assert!(!drainer.is_episode_drained());
        assert!(left.release_completion().unwrap());
        within(drainer.await_intermediate_drained()).await;
        assert!(drainer.is_episode_drained());

        assert_eq!(join.drain_calls(), 1);
        assert_eq!(hooks.notified_blobs().len(), 4);
        assert_eq!(hooks.notified_blobs().last(), Some(&left_out));
        assert_eq!(drainer.state(), DrainerState::NoDraining);
        assert!(!drainer.is_drained());
    }

    #[tokio::test]
    async fn test_deadlocked_blob_is_forced_and_late_completion_is_absorbed() {
        let blobs = chain(3);
        blobs[1].hold_completion();
        let stuck = blobs[1].id().unwrap();
        let hooks = Arc::new(RecordingHooks::default());
        let drainer = drainer_for(&blobs, hooks.clone(), deadlock_options(50));

        assert!(drainer.start_draining(DrainMode::Intermediate).unwrap());
        within(drainer.await_intermediate_drained()).await;

        assert_eq!(drainer.node_states().get(&stuck), Some(&NodeDrainState::DeadlockForced));
        assert_eq!(blobs[2].drain_calls(), 1);
        assert_eq!(hooks.notified_blobs().len(), 3);
        assert_eq!(*hooks.completed.lock().unwrap(), vec![false]);
        assert_eq!(drainer.state(), DrainerState::NoDraining);

        assert!(blobs[1].release_completion().unwrap());

        assert_eq!(blobs[2].drain_calls(), 1);
        assert_eq!(hooks.notified_blobs().len(), 3);
        assert_eq!(drainer.node_states().get(&stuck), Some(&NodeDrainState::DataCollected));
        within(drainer.await_drain_data()).await;
        assert!(drainer.collect_aggregate_drain_data().is_ok());
    }

    #[tokio::test]
    async fn test_blob_that_never_completes_still_lets_the_episode_finish() {
        let blobs = chain(3);
        blobs[1].set_completion(StubCompletion::Never);
        let stuck = blobs[1].id().unwrap();
        let drainer = drainer_for(&blobs, Arc::new(RecordingHooks::default()), deadlock_options(50));

        match within(drainer.drain_intermediate()).await {
            Err(DrainError::MissingDrainData { blob }) => assert_eq!(blob, stuck),
            other => panic!("expected missing drain data, got {:?}", other),
        }
        assert!(drainer.is_episode_drained());
        assert_eq!(drainer.state(), DrainerState::NoDraining);
        assert_eq!(blobs[2].drain_calls(), 1);
        assert_eq!(drainer.node_states().get(&stuck), Some(&NodeDrainState::DeadlockForced));
        assert!(!drainer.await_drain_data_timeout(Duration::from_millis(20)).await);

        blobs[1].set_completion(StubCompletion::Immediate);
        assert!(within(drainer.drain_intermediate()).await.unwrap().is_some());
        assert_eq!(drainer.episode(), 2);
    }

    #[tokio::test]
    async fn test_pushed_drain_data_is_accepted_once_after_completion() {
        let blobs = chain(2);
        blobs[0].hold_completion();
        let (head, tail) = (blobs[0].id().unwrap(), blobs[1].id().unwrap());
        let boundary = Token::new(0, 1);
        let options = DrainerOptions {
            drain_data_delivery: DrainDataDelivery::Push,
            ..DrainerOptions::default()
        };
        let drainer = drainer_for(&blobs, Arc::new(RecordingHooks::default()), options);

        assert!(drainer.start_draining(DrainMode::Intermediate).unwrap());
        assert!(matches!(
            drainer.on_drain_data_received(head, BlobDrainData::default()),
            Err(DrainError::DrainDataBeforeCompletion {
                state: NodeDrainState::Requested,
                ..
            })
        ));
        assert_eq!(drainer.node_states().get(&head), Some(&NodeDrainState::Requested));

        assert!(blobs[0].release_completion().unwrap());
        within(drainer.await_intermediate_drained()).await;
        assert_eq!(blobs[1].drain_calls(), 1);
        assert_eq!(drainer.node_states().get(&tail), Some(&NodeDrainState::Completed));
        assert!(!drainer.await_drain_data_timeout(Duration::from_millis(20)).await);

        let pushed = BlobDrainData {
            output_data: BTreeMap::from([(boundary, vec![json!("late")])]),
            ..BlobDrainData::default()
        };
        drainer.on_drain_data_received(head, pushed).unwrap();
        assert!(matches!(
            drainer.on_drain_data_received(head, BlobDrainData::default()),
            Err(DrainError::DuplicateDrainData { .. })
        ));
        drainer.on_drain_data_received(tail, BlobDrainData::default()).unwrap();
        within(drainer.await_drain_data()).await;

        let aggregate = drainer.collect_aggregate_drain_data().unwrap();
        assert_eq!(aggregate.data_for(&boundary), Some(&[json!("late")][..]));
    }

    #[tokio::test]
    async fn test_pushed_drain_data_is_refused_when_pulling() {
        let blobs = chain(2);
        blobs[0].hold_completion();
        let head = blobs[0].id().unwrap();
        let drainer = drainer_for(&blobs, Arc::new(RecordingHooks::default()), DrainerOptions::default());

        assert!(drainer.start_draining(DrainMode::Intermediate).unwrap());
        assert!(matches!(
            drainer.on_drain_data_received(head, BlobDrainData::default()),
            Err(DrainError::UnexpectedDrainData { blob }) if blob == head
        ));
        assert_eq!(drainer.node_states().get(&head), Some(&NodeDrainState::Requested));

        assert!(blobs[0].release_completion().unwrap());
        let data = within(async {
            drainer.await_drain_data().await;
            drainer.collect_aggregate_drain_data()
        })
        .await;
        assert!(data.is_ok());
        assert_eq!(blobs[1].drain_calls(), 1);
    }

    #[tokio::test]
    async fn test_final_episode_is_never_forced_by_default() {
        let blobs = chain(2);
        blobs[1].hold_completion();
        let drainer = drainer_for(&blobs, Arc::new(RecordingHooks::default()), deadlock_options(20));

        assert!(drainer.start_draining(DrainMode::Final).unwrap());
        assert!(!drainer.await_final_drained_timeout(Duration::from_millis(200)).await);
        assert_eq!(
            drainer.node_states().get(&blobs[1].id().unwrap()),
            Some(&NodeDrainState::Requested)
        );

        blobs[1].release_completion().unwrap();
        assert!(drainer.await_final_drained_timeout(WAIT).await);
    }

    #[tokio::test]
    async fn test_always_policy_forces_final_episodes() {
        let blobs = chain(2);
        blobs[1].hold_completion();
        let options = DrainerOptions {
            deadlock_policy: DeadlockPolicy::Always,
            ..deadlock_options(30)
        };
        let drainer = drainer_for(&blobs, Arc::new(RecordingHooks::default()), options);

        assert!(drainer.start_draining(DrainMode::Final).unwrap());
        assert!(drainer.await_final_drained_timeout(WAIT).await);
    }

    #[tokio::test]
    async fn test_repeated_intermediate_episodes_collect_fresh_data() {
        let blobs = chain(2);
        let boundary = Token::new(0, 1);
        blobs[0].set_drain_data(BlobDrainData {
            output_data: BTreeMap::from([(boundary, vec![json!(2)])]),
            ..BlobDrainData::default()
        });
        blobs[1].set_drain_data(BlobDrainData {
            input_data: BTreeMap::from([(boundary, vec![json!(1)])]),
            ..BlobDrainData::default()
        });
        let hooks = Arc::new(RecordingHooks::default());
        let drainer = drainer_for(&blobs, hooks.clone(), DrainerOptions::default());

        let first = within(drainer.drain_intermediate()).await.unwrap().unwrap();
        assert_eq!(first.data_for(&boundary), Some(&[json!(1), json!(2)][..]));
        assert_eq!(drainer.episode(), 1);

        blobs[0].set_drain_data(BlobDrainData::default());
        let second = within(drainer.drain_intermediate()).await.unwrap().unwrap();
        assert_eq!(second.data_for(&boundary), Some(&[json!(1)][..]));
        assert_eq!(drainer.episode(), 2);

        for blob in &blobs {
            assert_eq!(blob.drain_calls(), 2);
        }
        assert_eq!(*hooks.completed.lock().unwrap(), vec![false, false]);
    }

    #[tokio::test]
    async fn test_start_after_final_is_rejected() {
        let blobs = chain(2);
        let hooks = Arc::new(RecordingHooks::default());
        let drainer = drainer_for(&blobs, hooks.clone(), DrainerOptions::default());

        assert!(within(drainer.drain_final(false)).await.unwrap().is_some());
        assert!(drainer.is_drained());

        assert!(!drainer.start_draining(DrainMode::Intermediate).unwrap());
        assert!(!drainer.start_draining(DrainMode::Final).unwrap());
        assert!(drainer.drain_intermediate().await.unwrap().is_none());
        assert_eq!(hooks.prepared.lock().unwrap().len(), 1);
        assert_eq!(blobs[0].drain_calls(), 1);
    }

    #[tokio::test]
    async fn test_semi_final_is_final_for_the_drainer_only() {
        let blobs = chain(2);
        let hooks = Arc::new(RecordingHooks::default());
        let drainer = drainer_for(&blobs, hooks.clone(), DrainerOptions::default());

        assert!(drainer.start_draining_type(1).unwrap());
        within(drainer.await_final_drained()).await;

        assert_eq!(*hooks.prepared.lock().unwrap(), vec![false]);
        assert_eq!(*hooks.completed.lock().unwrap(), vec![true]);
        assert!(hooks.notified.lock().unwrap().iter().all(|(_, is_final)| *is_final));
        assert!(!drainer.start_draining_type(0).unwrap());
    }

    #[tokio::test]
    async fn test_second_start_during_intermediate_fails() {
        let blobs = chain(2);
        blobs[0].hold_completion();
        let drainer = drainer_for(&blobs, Arc::new(RecordingHooks::default()), DrainerOptions::default());

        assert!(drainer.start_draining(DrainMode::Intermediate).unwrap());
        assert!(matches!(
            drainer.start_draining(DrainMode::Final),
            Err(DrainError::EpisodeInProgress {
                state: DrainerState::Intermediate
            })
        ));
        assert!(matches!(drainer.stop(), Err(DrainError::StopDuringIntermediate)));
        assert_eq!(blobs[0].drain_calls(), 1);

        blobs[0].release_completion().unwrap();
        within(drainer.await_intermediate_drained()).await;
        assert!(drainer.start_draining(DrainMode::Final).unwrap());
    }

    #[tokio::test]
    async fn test_prepare_failure_leaves_drainer_idle() {
        let blobs = chain(2);
        let hooks = Arc::new(RecordingHooks {
            fail_prepare: true,
            ..RecordingHooks::default()
        });
        let drainer = drainer_for(&blobs, hooks, DrainerOptions::default());

        match drainer.start_draining(DrainMode::Intermediate) {
            Err(DrainError::PrepareFailed { reason }) => {
                assert!(reason.contains("tail buffer unavailable"))
            }
            other => panic!("expected prepare failure, got {:?}", other),
        }
        assert_eq!(drainer.state(), DrainerState::NoDraining);
        assert_eq!(drainer.episode(), 0);
        assert_eq!(blobs[0].drain_calls(), 0);
    }

    #[tokio::test]
    async fn test_discard_when_drain_data_is_not_collected() {
        let blobs = chain(2);
        let options = DrainerOptions {
            collect_drain_data: false,
            ..DrainerOptions::default()
        };
        let drainer = drainer_for(&blobs, Arc::new(RecordingHooks::default()), options);

        let data = within(drainer.drain_intermediate()).await.unwrap().unwrap();

        assert!(data.is_empty());
        assert_eq!(blobs[1].drain_kinds(), vec![DrainKind::Discard]);
        assert!(!drainer.graph().node(blobs[1].id().unwrap()).unwrap().has_drain_data());
    }

    #[tokio::test]
    async fn test_concurrent_branch_completions_drain_join_once() {
        let input = Token::overall_input(0);
        let branches = 8u32;
        let join_inputs: Vec<Token> = (1..=branches).map(|b| Token::new(b, 100)).collect();
        let mut blobs = vec![Arc::new(StubBlob::new(
            [input],
            (1..=branches).map(|b| Token::new(0, b)),
        ))];
        for branch in 1..=branches {
            blobs.push(Arc::new(
                StubBlob::new([Token::new(0, branch)], [Token::new(branch, 100)])
                    .with_completion(StubCompletion::Delayed(Duration::from_millis(u64::from(branch % 3)))),
            ));
        }
        let join = Arc::new(StubBlob::new(join_inputs, [Token::overall_output(100)]));
        blobs.push(join.clone());

        let hooks = Arc::new(RecordingHooks::default());
        let drainer = drainer_for(&blobs, hooks.clone(), DrainerOptions::default());

        assert!(within(drainer.drain_final(false)).await.unwrap().is_some());
        assert_eq!(join.drain_calls(), 1);
        assert_eq!(hooks.notified_blobs().len(), blobs.len());
        assert_eq!(hooks.notified_blobs().last(), join.id().as_ref());
        assert_eq!(*hooks.completed.lock().unwrap(), vec![true]);
    }

    #[tokio::test]
    async fn test_observer_sees_every_aggregate() {
        let blobs = chain(2);
        let boundary = Token::new(0, 1);
        blobs[1].set_drain_data(BlobDrainData {
            input_data: BTreeMap::from([(boundary, vec![json!("a"), json!("b")])]),
            ..BlobDrainData::default()
        });
        let statistics = Arc::new(DrainDataStatistics::new());
        let all: Vec<Arc<dyn Blob>> = blobs.iter().map(|blob| blob.clone() as Arc<dyn Blob>).collect();
        let drainer = Drainer::builder(BlobGraph::from_blobs(&all).unwrap())
            .blobs(all)
            .observer(statistics.clone())
            .build()
            .unwrap();

        within(drainer.drain_intermediate()).await.unwrap();
        within(drainer.drain_intermediate()).await.unwrap();

        assert_eq!(statistics.snapshot().get(&boundary), Some(&vec![2, 2]));
    }
}
