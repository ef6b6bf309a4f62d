//! End-to-end pagination through the public API

use chunk_pager::{
    ChunkPager, ChunkingConfig, ChunkingEngine, FileDiff, PagerError, SessionStore,
};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

fn synthetic_patch(lines: usize) -> String {
    let mut patch = String::from("@@ -1,0 +1,400 @@");
    for i in 0..lines {
        patch.push('\n');
        if i % 7 == 0 {
            patch.push_str(&format!("+fn handler_{}(req: Request) -> Response {{", i));
        } else if i % 7 == 6 {
            patch.push_str("+}");
        } else {
            patch.push_str(&format!("+    let value_{} = compute(&req, {});", i, i * 3));
        }
    }
    patch
}

fn pager_with(store: Arc<SessionStore>, max_cost: usize, overlap_lines: usize) -> ChunkPager {
    let config = ChunkingConfig {
        max_cost,
        overlap_lines,
        preserve_context: true,
    };
    ChunkPager::new(ChunkingEngine::default(), config, store).unwrap()
}

fn short_lived_store(ttl: Duration) -> Arc<SessionStore> {
    Arc::new(SessionStore::with_ttl(ttl, Duration::from_millis(10), 1000))
}

#[test]
fn test_full_traversal_covers_every_line() {
    let files = vec![
        FileDiff::new("src/handlers.rs", synthetic_patch(300)),
        FileDiff::new("assets/logo.png", ""),
        FileDiff::new("src/routes.rs", synthetic_patch(40)),
    ];
    let pager = pager_with(short_lived_store(Duration::from_secs(60)), 200, 3);

    let mut page = pager.open(&files, serde_json::json!({})).unwrap().unwrap();
    let mut pages = vec![page.clone()];
    while let Some(token) = page.continuation.clone() {
        page = pager.resume(&token, &files).unwrap();
        pages.push(page.clone());
    }

    // Every page of a file agrees with a direct chunking of that file
    for (file_index, file) in files.iter().enumerate() {
        let expected = pager.chunks_for(file);
        let served: Vec<_> = pages
            .iter()
            .filter(|p| p.file_index == file_index)
            .map(|p| p.chunk.clone())
            .collect();
        assert_eq!(served, expected);
    }

    // Union of covered lines is the whole file, in order
    let handlers: Vec<_> = pages.iter().filter(|p| p.file_index == 0).collect();
    assert!(handlers.len() > 1);
    let covered: BTreeSet<usize> = handlers
        .iter()
        .flat_map(|p| p.chunk.start_line..=p.chunk.end_line)
        .collect();
    assert_eq!(covered.len(), 301);
    for pair in handlers.windows(2) {
        assert!(pair[1].chunk.start_line <= pair[0].chunk.end_line + 1);
        assert!(pair[1].chunk.start_line > pair[0].chunk.start_line);
    }

    // Soft budget holds for every multi-line chunk
    for p in &pages {
        if p.chunk.line_count() > 1 {
            assert!(p.chunk.estimated_cost <= 200, "chunk over budget: {:?}", p.chunk);
        }
    }

    assert!(pages.iter().all(|p| p.file_index != 1));
    assert!(pages.last().unwrap().continuation.is_none());
}

#[test]
fn test_token_is_opaque_and_stable() {
    let files = vec![FileDiff::new("a.rs", synthetic_patch(120))];
    let pager = pager_with(short_lived_store(Duration::from_secs(60)), 100, 2);

    let first = pager.open(&files, serde_json::json!({ "pr": 1 })).unwrap().unwrap();
    let token = first.continuation.unwrap();

    assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
    let record = pager.store().decode(&token).unwrap();
    assert!(!token.contains(&record.session_id.simple().to_string()));

    let second = pager.resume(&token, &files).unwrap();
    assert_eq!(second.continuation.as_deref(), Some(token.as_str()));
    assert_eq!(second.chunk.chunk_index, 1);
}

#[test]
fn test_tampered_token_is_rejected() {
    let files = vec![FileDiff::new("a.rs", synthetic_patch(120))];
    let pager = pager_with(short_lived_store(Duration::from_secs(60)), 100, 2);

    let first = pager.open(&files, serde_json::json!({})).unwrap().unwrap();
    let token = first.continuation.unwrap();

    let mut tampered: Vec<char> = token.chars().collect();
    let last = tampered.len() - 1;
    tampered[last] = if tampered[last] == '0' { '1' } else { '0' };
    let tampered: String = tampered.into_iter().collect();

    let err = pager.resume(&tampered, &files).unwrap_err();
    assert!(matches!(err, PagerError::TokenInvalid));
    assert_eq!(err.kind(), "token_invalid");
}

#[tokio::test]
async fn test_expired_token_requires_restart() {
    let files = vec![FileDiff::new("a.rs", synthetic_patch(120))];
    let pager = pager_with(short_lived_store(Duration::from_millis(50)), 100, 2);

    let first = pager.open(&files, serde_json::json!({})).unwrap().unwrap();
    let token = first.continuation.unwrap();
    assert!(pager.resume(&token, &files).is_ok());

    tokio::time::sleep(Duration::from_millis(120)).await;

    let err = pager.resume(&token, &files).unwrap_err();
    assert!(matches!(err, PagerError::TokenInvalid));
    assert!(err.is_resubmittable());

    // A fresh read works and the expired record is gone
    let restarted = pager.open(&files, serde_json::json!({})).unwrap().unwrap();
    assert_eq!(restarted.chunk.chunk_index, 0);
    assert_eq!(pager.store().len(), 1);
}

#[tokio::test]
async fn test_concurrent_sessions_progress_independently() {
    let files = Arc::new(vec![FileDiff::new("a.rs", synthetic_patch(200))]);
    let pager = Arc::new(pager_with(short_lived_store(Duration::from_secs(60)), 150, 2));
    let expected = pager.chunks_for(&files[0]).len();

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let pager = Arc::clone(&pager);
            let files = Arc::clone(&files);
            tokio::spawn(async move {
                let mut page = pager.open(&files, serde_json::json!({})).unwrap().unwrap();
                let mut served = 1;
                while let Some(token) = page.continuation.clone() {
                    page = pager.resume(&token, &files).unwrap();
                    served += 1;
                    tokio::task::yield_now().await;
                }
                served
            })
        })
        .collect();

    for result in futures::future::join_all(handles).await {
        assert_eq!(result.unwrap(), expected);
    }
    assert_eq!(pager.store().len(), 8);
}
