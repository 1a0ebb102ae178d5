//! Engine-level end-to-end scenarios
//!
//! Exercises the full store → search → graph → analysis pipeline against a
//! temporary database with external services disabled.

use engram_e2e_tests::harness;

use engram_core::{
    AnalysisMode, AnalysisRequest, ChunkerConfig, CreateRelationshipInput, EngineError,
    MemoryListFilter, SearchMode, SearchOptions, StoreMemoryInput, Timeframe, UpdateMemoryInput,
};

#[tokio::test]
async fn store_then_search_offline() {
    let t = harness::offline_engine();

    let stored = t
        .engine
        .memory
        .store(StoreMemoryInput {
            content: "Hello world".to_string(),
            importance: Some(5),
            ..Default::default()
        })
        .await
        .unwrap();

    assert_eq!(stored.memory.importance, 5);
    assert!(stored.memory.tags.is_empty());
    assert_eq!(stored.memory.chunk_level, 0);
    assert!(stored.is_new);

    let response = t
        .engine
        .search
        .search(SearchOptions {
            query: "hello".to_string(),
            ..Default::default()
        })
        .await
        .unwrap();

    assert_eq!(response.mode, SearchMode::Keyword);
    assert_eq!(response.hits.len(), 1);
    assert!(response.hits[0].relevance > 0.0);
    assert_eq!(response.hits[0].memory.id, stored.memory.id);
}

#[tokio::test]
async fn chunked_store_normalizes_and_orders_children() {
    let (_dir, service) = harness::service_with_chunker(ChunkerConfig {
        min_chunk_size: 5,
        max_chunk_size: 10,
        overlap_size: 2,
    });

    let stored = service
        .store(StoreMemoryInput {
            content: "para1\n\npara2\n\npara3".to_string(),
            importance: Some(11),
            tags: vec!["A".to_string(), "a".to_string(), "  b ".to_string()],
            ..Default::default()
        })
        .await
        .unwrap();

    assert_eq!(stored.memory.importance, 10);
    assert_eq!(stored.memory.tags, vec!["a", "b"]);
    assert_eq!(stored.memory.content, "para1\n\npara2\n\npara3");

    let children = service
        .list(&MemoryListFilter {
            parent_id: Some(stored.memory.id.clone()),
            ..Default::default()
        })
        .unwrap();

    assert!(!children.is_empty());
    for (i, child) in children.iter().enumerate() {
        assert_eq!(child.chunk_index, Some(i as i32));
        assert_eq!(child.chunk_level, 1);
        assert_eq!(child.parent_memory_id.as_deref(), Some(stored.memory.id.as_str()));
        assert_eq!(child.importance, 10);
        assert_eq!(child.tags, vec!["a", "b"]);
    }

    let combined: String = children.iter().map(|c| c.content.as_str()).collect();
    assert!(combined.contains("para1"));
    assert!(combined.contains("para2"));
    assert!(combined.contains("para3"));
}

#[tokio::test]
async fn delete_cascades_chunks_and_relationships() {
    let (_dir, service) = harness::service_with_chunker(ChunkerConfig {
        min_chunk_size: 5,
        max_chunk_size: 10,
        overlap_size: 2,
    });

    let root = service
        .store(StoreMemoryInput {
            content: "alpha\n\nbeta\n\ngamma".to_string(),
            ..Default::default()
        })
        .await
        .unwrap();

    let children = service
        .list(&MemoryListFilter {
            parent_id: Some(root.memory.id.clone()),
            ..Default::default()
        })
        .unwrap();
    assert!(!children.is_empty());

    service.delete(&root.memory.id).await.unwrap();

    assert!(service.get(Some(&root.memory.id), None).unwrap().is_none());
    let orphans = service
        .list(&MemoryListFilter {
            parent_id: Some(root.memory.id.clone()),
            ..Default::default()
        })
        .unwrap();
    assert!(orphans.is_empty());
}

#[tokio::test]
async fn relationship_validation_rules() {
    let t = harness::offline_engine();

    let m1 = t
        .engine
        .memory
        .store(StoreMemoryInput {
            content: "first memory".to_string(),
            ..Default::default()
        })
        .await
        .unwrap()
        .memory;
    let m2 = t
        .engine
        .memory
        .store(StoreMemoryInput {
            content: "second memory".to_string(),
            ..Default::default()
        })
        .await
        .unwrap()
        .memory;

    // Out-of-range strength clamps to 1.0
    let edge = t
        .engine
        .graph
        .create(CreateRelationshipInput {
            source_id: m1.id.clone(),
            target_id: m2.id.clone(),
            relationship_type: "similar".to_string(),
            strength: Some(1.7),
            context: None,
        })
        .unwrap();
    assert!((edge.strength - 1.0).abs() < f64::EPSILON);

    // Self-edge rejected
    let self_edge = t.engine.graph.create(CreateRelationshipInput {
        source_id: m1.id.clone(),
        target_id: m1.id.clone(),
        relationship_type: "similar".to_string(),
        strength: Some(0.5),
        context: None,
    });
    assert!(matches!(self_edge, Err(EngineError::BadRequest(_))));

    // Missing endpoint rejected
    let missing = t.engine.graph.create(CreateRelationshipInput {
        source_id: m1.id.clone(),
        target_id: "m-missing".to_string(),
        relationship_type: "similar".to_string(),
        strength: Some(0.5),
        context: None,
    });
    assert!(matches!(missing, Err(EngineError::BadRequest(_))));
}

#[tokio::test]
async fn graph_chain_traversal() {
    let t = harness::offline_engine();

    let mut ids = Vec::new();
    for name in ["a", "b", "c", "d"] {
        let memory = t
            .engine
            .memory
            .store(StoreMemoryInput {
                content: format!("chain node {}", name),
                ..Default::default()
            })
            .await
            .unwrap()
            .memory;
        ids.push(memory.id);
    }

    for (i, strength) in [0.9, 0.8, 0.7].iter().enumerate() {
        t.engine
            .graph
            .create(CreateRelationshipInput {
                source_id: ids[i].clone(),
                target_id: ids[i + 1].clone(),
                relationship_type: "sequential".to_string(),
                strength: Some(*strength),
                context: None,
            })
            .unwrap();
    }

    // Depth 2 from the head reaches three nodes at distances 0, 1, 2
    let map = t.engine.graph.map_graph(&ids[0], Some(2), None, None).unwrap();
    assert_eq!(map.total_nodes, 3);
    assert_eq!(map.total_edges, 2);
    for node in &map.nodes {
        let expected = ids.iter().position(|id| *id == node.memory.id).unwrap() as u32;
        assert_eq!(node.distance, expected);
        assert!(node.distance <= 2);
    }

    // Strength floor cuts the traversal at the first weak edge
    let pruned = t
        .engine
        .graph
        .map_graph(&ids[0], Some(2), Some(0.85), None)
        .unwrap();
    assert_eq!(pruned.total_nodes, 2);
    assert_eq!(pruned.total_edges, 1);
}

#[tokio::test]
async fn rate_limiter_burst_exhaustion() {
    let t = harness::throttled_engine(1.0, 2.0);

    assert!(t.engine.limiter.allow("search").allowed);
    assert!(t.engine.limiter.allow("search").allowed);

    let third = t.engine.limiter.allow("search");
    assert!(!third.allowed);
    assert_eq!(third.limit_type, "global");
    assert!(third.retry_after.unwrap() >= std::time::Duration::from_millis(900));
}

#[tokio::test]
async fn analysis_over_empty_window_answers_without_model() {
    let t = harness::offline_engine();

    let response = t
        .engine
        .analysis
        .analyze(AnalysisRequest {
            mode: AnalysisMode::Question,
            question: Some("Who wrote this?".to_string()),
            timeframe: Timeframe::All,
            limit: None,
            session_id: None,
            domain: None,
        })
        .await
        .unwrap();

    assert_eq!(response.memory_count, 0);
    assert!(!response.answer.is_empty());
    assert!(response.memories.is_empty());
}

#[tokio::test]
async fn content_round_trip_preserves_bytes() {
    let t = harness::offline_engine();
    let content = "  line one\nline two with émoji 🎉\ttabbed  ";

    let stored = t
        .engine
        .memory
        .store(StoreMemoryInput {
            content: content.to_string(),
            ..Default::default()
        })
        .await
        .unwrap();

    let fetched = t
        .engine
        .memory
        .get(Some(&stored.memory.id), None)
        .unwrap()
        .unwrap();
    assert_eq!(fetched.content, content.trim());
}

#[tokio::test]
async fn update_partial_fields_only() {
    let t = harness::offline_engine();

    let stored = t
        .engine
        .memory
        .store(StoreMemoryInput {
            content: "original".to_string(),
            importance: Some(3),
            tags: vec!["keep".to_string()],
            ..Default::default()
        })
        .await
        .unwrap();

    let updated = t
        .engine
        .memory
        .update(
            &stored.memory.id,
            UpdateMemoryInput {
                importance: Some(15),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(updated.importance, 10);
    assert_eq!(updated.content, "original");
    assert_eq!(updated.tags, vec!["keep"]);
    assert!(updated.updated_at >= stored.memory.updated_at);

    let missing = t
        .engine
        .memory
        .update("ghost", UpdateMemoryInput::default())
        .await;
    assert!(matches!(missing, Err(EngineError::NotFound(_))));
}

#[tokio::test]
async fn empty_keyword_query_equals_listing() {
    let t = harness::offline_engine();

    for i in 0..5 {
        t.engine
            .memory
            .store(StoreMemoryInput {
                content: format!("note number {}", i),
                importance: Some(i + 1),
                ..Default::default()
            })
            .await
            .unwrap();
    }

    let mut searched: Vec<String> = t
        .engine
        .search
        .search(SearchOptions {
            query: String::new(),
            mode: Some(SearchMode::Keyword),
            limit: Some(10),
            ..Default::default()
        })
        .await
        .unwrap()
        .hits
        .into_iter()
        .map(|h| h.memory.id)
        .collect();

    let mut listed: Vec<String> = t
        .engine
        .memory
        .list(&MemoryListFilter {
            limit: Some(10),
            ..Default::default()
        })
        .unwrap()
        .into_iter()
        .map(|m| m.id)
        .collect();

    searched.sort();
    listed.sort();
    assert_eq!(searched, listed);
}

#[tokio::test]
async fn stats_count_all_record_kinds() {
    let t = harness::offline_engine();

    t.engine
        .memory
        .store(StoreMemoryInput {
            content: "counted".to_string(),
            domain: Some("engineering".to_string()),
            ..Default::default()
        })
        .await
        .unwrap();

    let stats = t.engine.memory.stats().unwrap();
    assert_eq!(stats.total_memories, 1);
    assert_eq!(stats.total_sessions, 1);
    assert_eq!(stats.total_domains, 1);
    assert_eq!(stats.total_categories, 0);
    assert_eq!(stats.current_session_id, "daemon-e2e");
}
