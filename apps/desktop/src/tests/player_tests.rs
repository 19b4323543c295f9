use super::*;

fn renderer(template: &str) -> CommandRenderer {
    CommandRenderer::new(template, std::env::temp_dir(), "bin")
}

#[tokio::test]
async fn acquire_writes_clip_and_release_removes_it() {
    let renderer = renderer("true");
    let handle = renderer.acquire(b"clip").await.expect("acquire");
    let path = renderer.path(handle).expect("path");
    assert_eq!(std::fs::read(&path).expect("read"), b"clip".to_vec());

    renderer.release(handle);
    assert!(!path.exists());
    assert!(renderer.path(handle).is_none());
}

#[cfg(unix)]
#[tokio::test]
async fn player_exit_status_decides_outcome() {
    let ok = renderer("true");
    let handle = ok.acquire(b"clip").await.expect("acquire");
    assert_eq!(ok.render(handle).await, Ok(()));
    ok.release(handle);

    let failing = renderer("false");
    let handle = failing.acquire(b"clip").await.expect("acquire");
    assert!(matches!(
        failing.render(handle).await,
        Err(PlaybackError::Render(_))
    ));
    failing.release(handle);
}

#[tokio::test]
async fn missing_player_is_a_render_error() {
    let renderer = renderer("holler-no-such-player-binary");
    let handle = renderer.acquire(b"clip").await.expect("acquire");
    assert!(renderer.render(handle).await.is_err());
    renderer.release(handle);
}

#[tokio::test]
async fn unknown_handle_is_a_render_error() {
    let renderer = renderer("true");
    assert!(renderer.render(ClipHandle(42)).await.is_err());
}
