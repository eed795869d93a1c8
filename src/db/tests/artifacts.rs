use crate::db::*;
use crate::types::CandidateId;
use tempfile::NamedTempFile;

fn sample_artifact(title: &str) -> NewArtifact {
    NewArtifact {
        kind: 1, // digest
        title: title.to_string(),
        author: None,
        content_hash: "a".repeat(64),
        size_bytes: 4096,
    }
}

#[tokio::test]
async fn test_insert_and_get_artifact() {
    let temp_file = NamedTempFile::new().unwrap();
    let db = Database::new(temp_file.path()).await.unwrap();

    let id = db
        .insert_artifact(&sample_artifact("Daily Digest 2026-08-30"))
        .await
        .unwrap();
    assert!(id.0 > 0);

    let artifact = db.get_artifact(id).await.unwrap().unwrap();
    assert_eq!(artifact.title, "Daily Digest 2026-08-30");
    assert_eq!(artifact.kind, 1);
    assert_eq!(artifact.size_bytes, 4096);
    assert!(artifact.created_at > 0);

    db.close().await;
}

#[tokio::test]
async fn test_identical_bytes_get_distinct_ids() {
    let temp_file = NamedTempFile::new().unwrap();
    let db = Database::new(temp_file.path()).await.unwrap();

    // Same content hash registered twice stays two artifacts
    let a = db.insert_artifact(&sample_artifact("First")).await.unwrap();
    let b = db.insert_artifact(&sample_artifact("Second")).await.unwrap();
    assert_ne!(a, b);

    let all = db.list_artifacts().await.unwrap();
    assert_eq!(all.len(), 2);

    db.close().await;
}

#[tokio::test]
async fn test_provenance_preserves_order() {
    let temp_file = NamedTempFile::new().unwrap();
    let db = Database::new(temp_file.path()).await.unwrap();

    let mut candidate_ids = Vec::new();
    for i in 0..3 {
        let id = db
            .insert_candidate_if_new(&NewCandidate {
                natural_key: format!("key-{i}"),
                source_id: "hn".to_string(),
                title: format!("Item {i}"),
                body: "body".to_string(),
                link: None,
                author: None,
                published_at: 1_700_000_000 + i,
            })
            .await
            .unwrap()
            .unwrap();
        candidate_ids.push(id);
    }

    let artifact_id = db.insert_artifact(&sample_artifact("Digest")).await.unwrap();

    // Link in a deliberately shuffled order
    let linked: Vec<CandidateId> = vec![candidate_ids[2], candidate_ids[0], candidate_ids[1]];
    db.link_artifact_candidates(artifact_id, &linked)
        .await
        .unwrap();

    let provenance = db.get_artifact_provenance(artifact_id).await.unwrap();
    assert_eq!(provenance, linked);

    db.close().await;
}
