use std::time::Duration;

use super::*;
use crate::{
    roster::ParticipantRoster,
    test_support::{drain_events, FakeRenderer, RenderCall},
};

struct Harness {
    renderer: Arc<FakeRenderer>,
    roster: SharedRoster,
    sequencer: Arc<PlaybackSequencer>,
    events: broadcast::Receiver<ClientEvent>,
}

fn harness(renderer: FakeRenderer, policy: SlotPolicy) -> Harness {
    let renderer = Arc::new(renderer);
    let roster = ParticipantRoster::shared();
    let (tx, events) = broadcast::channel(64);
    let sequencer = Arc::new(PlaybackSequencer::new(
        renderer.clone(),
        Arc::clone(&roster),
        tx,
        policy,
    ));
    Harness {
        renderer,
        roster,
        sequencer,
        events,
    }
}

fn speaking_transitions(events: &[ClientEvent]) -> Vec<(String, bool)> {
    events
        .iter()
        .filter_map(|event| match event {
            ClientEvent::SpeakingChanged { username, speaking } => {
                Some((username.clone(), *speaking))
            }
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn plays_clip_and_toggles_speaking_flag() {
    let mut h = harness(FakeRenderer::new(), SlotPolicy::PerContext);
    h.roster.lock().await.replace(["alice"]);

    let outcome = h
        .sequencer
        .play(PlaybackContext::Live, "alice", b"clip".to_vec())
        .await;

    assert_eq!(outcome, PlaybackOutcome::Completed);
    assert_eq!(
        h.renderer.calls(),
        vec![
            RenderCall::Acquire(b"clip".to_vec()),
            RenderCall::Render(b"clip".to_vec()),
            RenderCall::Release(b"clip".to_vec()),
        ]
    );
    assert!(!h.roster.lock().await.is_speaking("alice"));
    assert_eq!(
        speaking_transitions(&drain_events(&mut h.events)),
        vec![("alice".to_string(), true), ("alice".to_string(), false)]
    );
}

#[tokio::test]
async fn muted_speaker_never_reaches_renderer() {
    let mut h = harness(FakeRenderer::new(), SlotPolicy::PerContext);
    {
        let mut roster = h.roster.lock().await;
        roster.replace(["alice"]);
        roster.toggle_muted("alice");
    }

    let outcome = h
        .sequencer
        .play(PlaybackContext::Live, "alice", b"clip".to_vec())
        .await;

    assert_eq!(outcome, PlaybackOutcome::Completed);
    assert!(h.renderer.calls().is_empty());
    assert!(speaking_transitions(&drain_events(&mut h.events)).is_empty());
}

#[tokio::test]
async fn render_failure_is_reported_and_cleaned_up() {
    let mut h = harness(FakeRenderer::new().failing_render("device lost"), SlotPolicy::PerContext);
    h.roster.lock().await.replace(["alice"]);

    let outcome = h
        .sequencer
        .play(PlaybackContext::Live, "alice", b"clip".to_vec())
        .await;

    assert_eq!(
        outcome,
        PlaybackOutcome::Failed(PlaybackError::Render("device lost".into()))
    );
    assert_eq!(h.renderer.release_count(), 1);
    assert_eq!(h.renderer.outstanding(), 0);
    assert!(!h.roster.lock().await.is_speaking("alice"));
    let events = drain_events(&mut h.events);
    assert_eq!(speaking_transitions(&events).len(), 2);
    assert!(events.iter().any(|event| matches!(
        event,
        ClientEvent::PlaybackFinished {
            outcome: PlaybackOutcome::Failed(_),
            ..
        }
    )));
}

#[tokio::test]
async fn acquire_failure_never_marks_speaking() {
    let mut h = harness(FakeRenderer::new().failing_acquire("bad codec"), SlotPolicy::PerContext);
    h.roster.lock().await.replace(["alice"]);

    let outcome = h
        .sequencer
        .play(PlaybackContext::Live, "alice", b"clip".to_vec())
        .await;

    assert!(!outcome.is_completed());
    assert_eq!(h.renderer.release_count(), 0);
    assert!(speaking_transitions(&drain_events(&mut h.events)).is_empty());
}

#[tokio::test]
async fn repeated_plays_do_not_leak_resources() {
    let h = harness(FakeRenderer::new(), SlotPolicy::PerContext);
    for i in 0..5u8 {
        h.sequencer
            .play(PlaybackContext::Live, "alice", vec![i])
            .await;
    }
    assert_eq!(h.renderer.rendered().len(), 5);
    assert_eq!(h.renderer.release_count(), 5);
    assert_eq!(h.renderer.outstanding(), 0);
}

#[tokio::test(start_paused = true)]
async fn same_context_plays_never_overlap() {
    let h = harness(
        FakeRenderer::new().with_render_delay(Duration::from_secs(1)),
        SlotPolicy::PerContext,
    );

    let first = {
        let sequencer = Arc::clone(&h.sequencer);
        tokio::spawn(async move {
            sequencer
                .play(PlaybackContext::Live, "alice", b"one".to_vec())
                .await
        })
    };
    h.renderer.render_started.notified().await;

    let second = {
        let sequencer = Arc::clone(&h.sequencer);
        tokio::spawn(async move {
            sequencer
                .play(PlaybackContext::Live, "bob", b"two".to_vec())
                .await
        })
    };
    tokio::task::yield_now().await;
    assert_eq!(h.renderer.rendered(), vec![b"one".to_vec()]);

    first.await.expect("first");
    second.await.expect("second");
    let calls = h.renderer.calls();
    let release_one = calls
        .iter()
        .position(|call| *call == RenderCall::Release(b"one".to_vec()))
        .expect("release one");
    let acquire_two = calls
        .iter()
        .position(|call| *call == RenderCall::Acquire(b"two".to_vec()))
        .expect("acquire two");
    assert!(release_one < acquire_two);
}

#[tokio::test(start_paused = true)]
async fn contexts_overlap_unless_slot_is_shared() {
    for (policy, expect_overlap) in [(SlotPolicy::PerContext, true), (SlotPolicy::Shared, false)] {
        let h = harness(
            FakeRenderer::new().with_render_delay(Duration::from_secs(1)),
            policy,
        );
        let live = {
            let sequencer = Arc::clone(&h.sequencer);
            tokio::spawn(async move {
                sequencer
                    .play(PlaybackContext::Live, "alice", b"live".to_vec())
                    .await
            })
        };
        h.renderer.render_started.notified().await;
        let catch_up = {
            let sequencer = Arc::clone(&h.sequencer);
            tokio::spawn(async move {
                sequencer
                    .play(PlaybackContext::CatchUp, "bob", b"history".to_vec())
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(h.renderer.rendered().len() == 2, expect_overlap, "{policy:?}");

        live.await.expect("live");
        catch_up.await.expect("catch-up");
        assert_eq!(h.renderer.rendered().len(), 2);
    }
}

#[tokio::test(start_paused = true)]
async fn muted_speaker_does_not_wait_for_busy_slot() {
    for policy in [SlotPolicy::PerContext, SlotPolicy::Shared] {
        let h = harness(
            FakeRenderer::new().with_render_delay(Duration::from_secs(2)),
            policy,
        );
        h.roster.lock().await.set_muted("bob", true);
        let live = {
            let sequencer = Arc::clone(&h.sequencer);
            tokio::spawn(async move {
                sequencer
                    .play(PlaybackContext::Live, "alice", b"live".to_vec())
                    .await
            })
        };
        h.renderer.render_started.notified().await;

        let started = tokio::time::Instant::now();
        for context in [PlaybackContext::Live, PlaybackContext::CatchUp] {
            let outcome = h.sequencer.play(context, "bob", b"muted".to_vec()).await;
            assert_eq!(outcome, PlaybackOutcome::Completed);
        }
        assert_eq!(started.elapsed(), Duration::ZERO, "{policy:?}");

        live.await.expect("live");
        assert_eq!(h.renderer.rendered(), vec![b"live".to_vec()]);
    }
}

#[tokio::test(start_paused = true)]
async fn speaking_flag_holds_while_any_context_renders() {
    let mut h = harness(
        FakeRenderer::new().with_render_delay(Duration::from_secs(2)),
        SlotPolicy::PerContext,
    );
    h.roster.lock().await.replace(["alice"]);
    let live = {
        let sequencer = Arc::clone(&h.sequencer);
        tokio::spawn(async move {
            sequencer
                .play(PlaybackContext::Live, "alice", b"live".to_vec())
                .await
        })
    };
    tokio::time::sleep(Duration::from_secs(1)).await;
    let catch_up = {
        let sequencer = Arc::clone(&h.sequencer);
        tokio::spawn(async move {
            sequencer
                .play(PlaybackContext::CatchUp, "alice", b"history".to_vec())
                .await
        })
    };

    live.await.expect("live");
    assert!(h.roster.lock().await.is_speaking("alice"));

    catch_up.await.expect("catch-up");
    assert!(!h.roster.lock().await.is_speaking("alice"));
    assert_eq!(
        speaking_transitions(&drain_events(&mut h.events)),
        vec![("alice".to_string(), true), ("alice".to_string(), false)]
    );
}
