//! End-to-end tests for the question-answering path, with Supabase and the
//! completion endpoint served by mocks and the deterministic hash embedding
//! backend doing the vectorization.

use docchat::config::Config;
use docchat::embedding::{EmbeddingClient, HashEmbeddingClient};
use docchat::processing::chunking::chunk_text;
use docchat::processing::types::NO_MATCH_ANSWER;
use docchat::processing::{ChatError, ProcessingApi, ProcessingService};
use httpmock::prelude::*;
use serde_json::json;

fn test_config(supabase_url: &str, openai_url: &str) -> Config {
    Config {
        supabase_url: supabase_url.to_string(),
        supabase_service_key: "service-key".to_string(),
        upload_bucket: "uploads".to_string(),
        openai_api_key: None,
        openai_base_url: openai_url.to_string(),
        openai_chat_model: "gpt-4o-mini".to_string(),
        openai_embedding_model: "text-embedding-3-small".to_string(),
        embedding_dimension: 64,
        chunk_target_size: 1200,
        match_threshold: 0.2,
        match_count: 6,
        max_upload_bytes: 10 * 1024 * 1024,
        server_port: None,
    }
}

#[tokio::test]
async fn invalid_questions_never_reach_the_backends() {
    let supabase = MockServer::start_async().await;
    let openai = MockServer::start_async().await;

    let match_mock = supabase.mock(|when, then| {
        when.method(POST).path("/rest/v1/rpc/match_documents");
        then.status(200).json_body(json!([]));
    });
    let completion_mock = openai.mock(|when, then| {
        when.method(POST).path("/v1/chat/completions");
        then.status(200).json_body(json!({ "choices": [] }));
    });

    let service = ProcessingService::new(test_config(&supabase.base_url(), &openai.base_url()));

    let oversized = "q".repeat(1300);
    for question in ["", "   ", "hi", oversized.as_str()] {
        let error = service.answer(question).await.unwrap_err();
        assert!(matches!(error, ChatError::InvalidQuestion(_)));
    }

    assert_eq!(match_mock.hits(), 0);
    assert_eq!(completion_mock.hits(), 0);
}

#[tokio::test]
async fn empty_retrieval_short_circuits_the_completion_call() {
    let supabase = MockServer::start_async().await;
    let openai = MockServer::start_async().await;

    let match_mock = supabase.mock(|when, then| {
        when.method(POST)
            .path("/rest/v1/rpc/match_documents")
            .header("apikey", "service-key")
            .header("authorization", "Bearer service-key");
        then.status(200).json_body(json!([]));
    });
    let completion_mock = openai.mock(|when, then| {
        when.method(POST).path("/v1/chat/completions");
        then.status(200).json_body(json!({ "choices": [] }));
    });

    let service = ProcessingService::new(test_config(&supabase.base_url(), &openai.base_url()));
    let result = service
        .answer("Is there anything about trains?")
        .await
        .expect("answer");

    assert_eq!(result.answer, NO_MATCH_ANSWER);
    assert!(result.sources.is_empty());
    assert_eq!(match_mock.hits(), 1);
    assert_eq!(completion_mock.hits(), 0);
}

#[tokio::test]
async fn answers_carry_ranked_sources_with_rounded_scores() {
    let supabase = MockServer::start_async().await;
    let openai = MockServer::start_async().await;

    supabase.mock(|when, then| {
        when.method(POST).path("/rest/v1/rpc/match_documents");
        then.status(200).json_body(json!([
            {
                "title": "handbook.pdf",
                "chunk_index": 3,
                "content": "Annual leave accrues at two days per month of service.",
                "similarity": 0.812_349
            },
            {
                "title": "policies.pdf",
                "chunk_index": 0,
                "content": "Leave requests must be filed a week in advance.",
                "similarity": 0.431_2
            }
        ]));
    });
    let completion_mock = openai.mock(|when, then| {
        when.method(POST)
            .path("/v1/chat/completions")
            .body_contains("[Source 1] handbook.pdf (chunk 3")
            .body_contains("[Source 2] policies.pdf (chunk 0");
        then.status(200).json_body(json!({
            "choices": [
                { "message": { "role": "assistant", "content": "Two days per month [Source 1]." } }
            ]
        }));
    });

    let service = ProcessingService::new(test_config(&supabase.base_url(), &openai.base_url()));
    let result = service
        .answer("How fast does annual leave accrue?")
        .await
        .expect("answer");

    assert_eq!(result.answer, "Two days per month [Source 1].");
    assert_eq!(result.sources.len(), 2);
    assert_eq!(result.sources[0].title, "handbook.pdf");
    assert_eq!(result.sources[0].chunk_index, 3);
    assert!((result.sources[0].similarity - 0.8123).abs() < 1e-6);
    assert!(result.sources[0].excerpt.starts_with("Annual leave accrues"));
    assert_eq!(result.sources[1].title, "policies.pdf");
    assert_eq!(completion_mock.hits(), 1);
}

/// Repeat `sentence` until the paragraph is long enough to become its own
/// chunk at the target size used below.
fn topic_paragraph(sentence: &str) -> String {
    let mut out = String::new();
    while out.len() < 400 {
        out.push_str(sentence);
        out.push(' ');
    }
    out.trim_end().to_string()
}

// unit vectors, so the dot product is the cosine similarity
fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

#[tokio::test]
async fn the_most_related_paragraph_ranks_first() {
    let supabase = MockServer::start_async().await;
    let openai = MockServer::start_async().await;

    // three distinguishable paragraphs; the middle one answers the question
    let text = format!(
        "{}\n\n{}\n\n{}",
        topic_paragraph(
            "The turbine maintenance crew lubricates bearings and inspects rotor blades for wear."
        ),
        topic_paragraph(
            "Payroll runs on the final business day and salary corrections are handled by the payroll team."
        ),
        topic_paragraph(
            "The community garden volunteers water tomato seedlings and compost the clippings."
        ),
    );
    let chunks = chunk_text(&text, 520);
    assert_eq!(chunks.len(), 3);

    let question = "When does payroll run and how are salary corrections handled?";
    let embedder = HashEmbeddingClient::new(256);
    let query = embedder.embed(question).await.expect("embed question");

    let mut scored: Vec<(usize, String, f32)> = Vec::new();
    for (chunk_index, chunk) in chunks.iter().enumerate() {
        let vector = embedder.embed(chunk).await.expect("embed chunk");
        scored.push((chunk_index, chunk.clone(), dot(&query, &vector)));
    }
    scored.sort_by(|a, b| b.2.total_cmp(&a.2));

    let payroll_index = chunks
        .iter()
        .position(|chunk| chunk.contains("Payroll runs"))
        .expect("payroll chunk");
    assert_eq!(scored[0].0, payroll_index, "payroll chunk should rank first");
    assert!(scored[0].2 > scored[1].2, "ranking should be strict");

    // serve what the store would: rows above the threshold, best first
    let rows: Vec<serde_json::Value> = scored
        .iter()
        .filter(|(_, _, similarity)| *similarity >= 0.2)
        .map(|(chunk_index, content, similarity)| {
            json!({
                "title": "office.pdf",
                "chunk_index": chunk_index,
                "content": content,
                "similarity": similarity,
            })
        })
        .collect();
    assert!(!rows.is_empty());

    supabase.mock(|when, then| {
        when.method(POST).path("/rest/v1/rpc/match_documents");
        then.status(200).json_body(serde_json::Value::Array(rows));
    });
    openai.mock(|when, then| {
        when.method(POST)
            .path("/v1/chat/completions")
            .body_contains("Payroll runs on the final business day");
        then.status(200).json_body(json!({
            "choices": [
                { "message": { "role": "assistant", "content": "On the final business day [Source 1]." } }
            ]
        }));
    });

    let mut config = test_config(&supabase.base_url(), &openai.base_url());
    config.embedding_dimension = 256;
    config.chunk_target_size = 520;
    let service = ProcessingService::new(config);

    let result = service.answer(question).await.expect("answer");
    assert_eq!(result.sources[0].chunk_index, payroll_index);
    assert!(result.sources[0].excerpt.contains("Payroll"));
    assert_eq!(result.answer, "On the final business day [Source 1].");
}

#[tokio::test]
async fn documents_are_grouped_by_title_newest_first() {
    let supabase = MockServer::start_async().await;
    let openai = MockServer::start_async().await;

    supabase.mock(|when, then| {
        when.method(GET)
            .path("/rest/v1/documents")
            .query_param("select", "title,created_at")
            .query_param("order", "created_at.desc");
        then.status(200).json_body(json!([
            { "title": "policies.pdf", "created_at": "2026-08-22T08:30:00Z" },
            { "title": "handbook.pdf", "created_at": "2026-08-20T10:00:00Z" },
            { "title": "handbook.pdf", "created_at": "2026-08-20T09:59:58Z" },
            { "title": "handbook.pdf", "created_at": "2026-08-20T09:59:55Z" }
        ]));
    });

    let service = ProcessingService::new(test_config(&supabase.base_url(), &openai.base_url()));
    let documents = service.list_documents().await.expect("list");

    assert_eq!(documents.len(), 2);
    assert_eq!(documents[0].title, "policies.pdf");
    assert_eq!(documents[0].chunks, 1);
    assert_eq!(documents[1].title, "handbook.pdf");
    assert_eq!(documents[1].chunks, 3);
    assert_eq!(documents[1].latest_upload_at, "2026-08-20T10:00:00Z");
}

#[tokio::test]
async fn deleting_a_document_filters_by_title() {
    let supabase = MockServer::start_async().await;
    let openai = MockServer::start_async().await;

    let delete_mock = supabase.mock(|when, then| {
        when.method(DELETE)
            .path("/rest/v1/documents")
            .query_param("title", "eq.handbook.pdf");
        then.status(204);
    });

    let service = ProcessingService::new(test_config(&supabase.base_url(), &openai.base_url()));
    service
        .delete_document("handbook.pdf")
        .await
        .expect("delete");

    assert_eq!(delete_mock.hits(), 1);
}
