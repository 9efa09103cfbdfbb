//! Subtitle jobs against an in-process platform.

mod common;

use common::{FakePlatform, FakeVideo, JSON3_HELLO, SRV3_HELLO};
use futures::StreamExt;
use pagewise::pipeline::sink::{
    combined_transcript_path, PerUnitFileSink, TranscriptSink, NO_SUBTITLES_PLACEHOLDER,
};
use pagewise::pipeline::UnitSink;
use pagewise::stream::{subtitle_event_stream, JobEvent};
use pagewise::subtitles::extract_text;
use pagewise::subtitles::job::{resolve_collection, run_subtitle_job};
use pagewise::subtitles::platform::VideoPlatform;
use pagewise::{CancelFlag, PipelineError, SubtitleConfig};
use std::sync::Arc;

const PLAYLIST_URL: &str = "https://video.test/playlist?list=PL1";

fn scratch_config(dir: &std::path::Path) -> SubtitleConfig {
    SubtitleConfig {
        scratch_root: Some(dir.to_path_buf()),
        ..SubtitleConfig::default()
    }
}

fn two_videos() -> Arc<dyn VideoPlatform> {
    Arc::new(FakePlatform::new(vec![
        FakeVideo::with_json3("a1", "First talk", JSON3_HELLO),
        FakeVideo::without_captions("b2", "Second talk"),
    ]))
}

#[test]
fn json3_and_srv3_agree() {
    assert_eq!(extract_text(JSON3_HELLO).unwrap(), "hello world it's fine");
    assert_eq!(
        extract_text(JSON3_HELLO).unwrap(),
        extract_text(SRV3_HELLO).unwrap()
    );
}

#[tokio::test]
async fn streams_do_not_share_a_cancel_flag() {
    let scratch = tempfile::tempdir().unwrap();
    let shared = CancelFlag::new();
    shared.cancel();
    let config = SubtitleConfig {
        cancel: Some(shared.clone()),
        ..scratch_config(scratch.path())
    };

    for _ in 0..2 {
        let events: Vec<JobEvent> =
            subtitle_event_stream(PLAYLIST_URL.to_string(), two_videos(), config.clone())
                .collect()
                .await;
        assert!(
            matches!(events.last(), Some(JobEvent::Complete { video_count: 2, .. })),
            "{events:?}"
        );
    }
}

#[tokio::test]
async fn playlist_with_a_silent_video() {
    let scratch = tempfile::tempdir().unwrap();
    let events: Vec<JobEvent> = subtitle_event_stream(
        PLAYLIST_URL.to_string(),
        two_videos(),
        scratch_config(scratch.path()),
    )
    .collect()
    .await;

    let progress: Vec<(String, usize, usize)> = events
        .iter()
        .filter_map(|e| match e {
            JobEvent::Progress {
                message,
                current,
                total,
            } => Some((message.clone(), *current, *total)),
            _ => None,
        })
        .collect();
    assert_eq!(
        progress,
        vec![
            ("📋 Found playlist with 2 videos".to_string(), 0, 2),
            ("⏳ Processing video 1/2...".to_string(), 0, 2),
            ("📥 Downloading: First talk...".to_string(), 0, 2),
            ("✅ Completed: First talk...".to_string(), 1, 2),
            ("⏳ Processing video 2/2...".to_string(), 1, 2),
            ("📥 Downloading: Second talk...".to_string(), 1, 2),
        ]
    );

    let Some(JobEvent::Complete {
        success,
        title,
        text,
        video_count,
        message,
    }) = events.last()
    else {
        panic!("stream must end with a complete event: {events:?}");
    };
    assert!(*success);
    assert_eq!(title, "Playlist: 2 videos");
    assert_eq!(*video_count, 2);
    assert_eq!(message, "✨ Completed! Extracted subtitles from 2 video(s)");
    assert!(text.starts_with(&"=".repeat(80)));
    assert!(text.contains("📹 First talk"));
    assert!(text.contains("hello world it's fine"));
    assert!(text.contains(&format!("📹 Second talk\n{}\n\n{}", "=".repeat(80), NO_SUBTITLES_PLACEHOLDER)));

    // Scratch directories are gone once the job is over.
    assert_eq!(std::fs::read_dir(scratch.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn invalid_url_is_an_in_band_error() {
    let events: Vec<JobEvent> =
        subtitle_event_stream("not a url".into(), two_videos(), SubtitleConfig::default())
            .collect()
            .await;
    assert_eq!(events.len(), 1);
    assert!(matches!(&events[0], JobEvent::Error { message } if message.contains("not a url")));
}

#[tokio::test]
async fn single_video_uses_its_title() {
    let scratch = tempfile::tempdir().unwrap();
    let platform = two_videos();
    let url = "https://video.test/watch?v=a1";
    let collection = resolve_collection(platform.as_ref(), url).await.unwrap();
    assert!(!collection.is_playlist);

    let output = run_subtitle_job(
        platform,
        url,
        collection,
        &scratch_config(scratch.path()),
        None,
        &mut [],
    )
    .await
    .unwrap();
    assert_eq!(output.title, "First talk");
    assert_eq!(output.video_count, 1);
    assert!(output.has_content());
}

#[tokio::test]
async fn unresolvable_url_is_a_resolve_failure() {
    let platform = FakePlatform {
        fail_resolve: true,
        ..FakePlatform::default()
    };
    let err = resolve_collection(&platform, "https://video.test/watch?v=zz")
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::ResolveFailed { .. }));
}

#[tokio::test]
async fn per_video_files_and_mirrored_transcript() {
    let scratch = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    let platform: Arc<dyn VideoPlatform> = Arc::new(FakePlatform::new(vec![
        FakeVideo::with_srv3("a1", "Part: one", SRV3_HELLO),
        FakeVideo::without_captions("b2", "Part two"),
        FakeVideo::with_json3("c3", "Part three", JSON3_HELLO),
    ]));
    let collection = resolve_collection(platform.as_ref(), PLAYLIST_URL)
        .await
        .unwrap();

    let combined = out.path().join("all.txt");
    let mut mirror = TranscriptSink::with_mirror(&combined).await.unwrap();
    let mut files = PerUnitFileSink::create(out.path()).await.unwrap();
    let output = {
        let mut extra: Vec<&mut dyn UnitSink> = vec![&mut mirror, &mut files];
        run_subtitle_job(
            platform,
            PLAYLIST_URL,
            collection,
            &scratch_config(scratch.path()),
            None,
            &mut extra,
        )
        .await
        .unwrap()
    };

    assert_eq!(output.report.stats.succeeded_units, 2);
    assert_eq!(output.report.stats.empty_units, 1);
    assert_eq!(files.written().len(), 2);
    assert!(out.path().join("Part_ one.txt").exists());
    assert!(!out.path().join("Part two.txt").exists());

    let on_disk = std::fs::read_to_string(&combined).unwrap();
    assert_eq!(on_disk, format!("{}\n", output.text));
}

/// Run one video through the `subs` command layout: a mirrored transcript
/// and per-video files in the same directory.
async fn single_video_layout(
    out: &std::path::Path,
    combined: &std::path::Path,
) -> (pagewise::SubtitleJobOutput, Vec<std::path::PathBuf>) {
    let scratch = tempfile::tempdir().unwrap();
    let platform: Arc<dyn VideoPlatform> = Arc::new(FakePlatform::new(vec![
        FakeVideo::with_json3("a1", "Talk", JSON3_HELLO),
    ]));
    let url = "https://video.test/watch?v=a1";
    let collection = resolve_collection(platform.as_ref(), url).await.unwrap();

    let mut mirror = TranscriptSink::with_mirror(combined).await.unwrap();
    let mut files = PerUnitFileSink::create(out).await.unwrap();
    files.reserve(combined);
    let output = {
        let mut extra: Vec<&mut dyn UnitSink> = vec![&mut mirror, &mut files];
        run_subtitle_job(
            platform,
            url,
            collection,
            &scratch_config(scratch.path()),
            None,
            &mut extra,
        )
        .await
        .unwrap()
    };
    (output, files.written().to_vec())
}

#[tokio::test]
async fn default_layout_keeps_transcript_intact() {
    let out = tempfile::tempdir().unwrap();
    let combined = combined_transcript_path(out.path(), "Talk");
    let (output, written) = single_video_layout(out.path(), &combined).await;

    let on_disk = std::fs::read_to_string(&combined).unwrap();
    assert!(!on_disk.contains('\0'));
    assert_eq!(on_disk, format!("{}\n", output.text));
    assert!(on_disk.starts_with(&"=".repeat(80)));
    assert!(on_disk.contains("📹 Talk"));

    assert_eq!(written, vec![out.path().join("Talk.txt")]);
    assert_eq!(
        std::fs::read_to_string(out.path().join("Talk.txt")).unwrap(),
        "hello world it's fine"
    );
}

#[tokio::test]
async fn combined_path_named_like_a_video_is_not_clobbered() {
    let out = tempfile::tempdir().unwrap();
    let combined = out.path().join("Talk.txt");
    let (output, written) = single_video_layout(out.path(), &combined).await;

    let on_disk = std::fs::read_to_string(&combined).unwrap();
    assert_eq!(on_disk, format!("{}\n", output.text));
    assert_eq!(written, vec![out.path().join("Talk (1).txt")]);
}
