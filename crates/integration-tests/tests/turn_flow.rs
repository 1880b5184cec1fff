//! End-to-end turn scenarios: search, resume and completion.

use cartwise_assistant::db::{InteractionLog, ProductStore, SavedItemStore, SessionStore};
use cartwise_assistant::llm::{ModelReply, Role};
use cartwise_assistant::models::TokenUsage;
use cartwise_assistant::services::{TurnError, TurnPhase};
use cartwise_core::{Platform, SavedList, UserId};
use cartwise_integration_tests::{
    ScriptedModel, StubProvider, TestContext, calls, product, text,
};
use rust_decimal::Decimal;

const HOODIE_SEARCH: &str = r#"{"keywords":["blue","hoodie"],"maxPrice":50}"#;

fn hoodie_providers() -> Vec<std::sync::Arc<StubProvider>> {
    vec![
        StubProvider::returning(
            Platform::Amazon,
            vec![
                product(Platform::Amazon, "B0HOODIE1", "Blue Zip Hoodie", 45),
                product(Platform::Amazon, "B0HOODIE2", "Navy Pullover Hoodie", 39),
            ],
        ),
        StubProvider::returning(
            Platform::Noon,
            vec![product(Platform::Noon, "N12345", "Sky Blue Hoodie", 49)],
        ),
    ]
}

fn with_usage(reply: Result<ModelReply, cartwise_assistant::llm::LlmError>, total: i64) -> Result<ModelReply, cartwise_assistant::llm::LlmError> {
    reply.map(|mut r| {
        r.usage = TokenUsage {
            prompt_tokens: total - 10,
            completion_tokens: 10,
            total_tokens: total,
        };
        r
    })
}

// =============================================================================
// Blue Hoodie
// =============================================================================

#[tokio::test]
async fn test_blue_hoodie_end_to_end() {
    let model = ScriptedModel::new(vec![
        with_usage(calls(&[("call_search", "search_products", HOODIE_SEARCH)]), 100),
        with_usage(
            text("Top picks: the Blue Zip Hoodie (amazon:B0HOODIE1) and the Sky Blue Hoodie (noon:N12345)."),
            200,
        ),
    ]);
    let ctx = TestContext::new(model.clone(), hoodie_providers());
    let session = ctx.session().await;
    assert!(session.has_default_title());

    // First step: search runs, partial results come back immediately.
    let first = ctx
        .engine()
        .send_message(ctx.user_id, session.id, "find me a blue hoodie under 50")
        .await
        .expect("send message");

    assert_eq!(first.next, "secondary_step");
    assert_eq!(first.phase, TurnPhase::AwaitingSecondaryStep);
    assert_eq!(first.products.get(&Platform::Amazon).map(Vec::len), Some(2));
    assert_eq!(first.products.get(&Platform::Noon).map(Vec::len), Some(1));
    assert_eq!(ctx.store.product_count().await, 3);

    let renamed = ctx
        .store
        .find_session(session.id)
        .await
        .expect("find session")
        .expect("session exists");
    assert_eq!(renamed.title, "blue hoodie");

    // Resume: top picks over every provider's results.
    let second = ctx
        .engine()
        .resume(ctx.user_id, first.interaction_id)
        .await
        .expect("resume");

    assert_eq!(second.next, "complete");
    assert_eq!(second.phase, TurnPhase::Complete);
    assert!(
        second
            .message
            .as_deref()
            .is_some_and(|m| m.starts_with("Top picks"))
    );

    let requests = model.requests();
    assert_eq!(requests.len(), 2);
    assert!(requests[0].tools.contains(&"search_products".to_string()));
    assert!(!requests[1].tools.contains(&"search_products".to_string()));

    let follow_up = &requests[1].messages;
    let search_result = follow_up
        .iter()
        .find(|m| m.role == Role::Tool && m.tool_call_id.as_deref() == Some("call_search"))
        .and_then(|m| m.content.clone())
        .expect("search result in follow-up transcript");
    assert!(search_result.contains("Amazon results:"));
    assert!(search_result.contains("noon results:"));
    assert!(
        follow_up
            .last()
            .and_then(|m| m.content.as_deref())
            .is_some_and(|c| c.contains("\"blue hoodie\""))
    );

    let stored = ctx
        .store
        .find_interaction(first.interaction_id)
        .await
        .expect("find interaction")
        .expect("interaction exists");
    assert_eq!(stored.next, "complete");
    assert_eq!(stored.usage.total_tokens, 300);
    assert_eq!(stored.model.as_deref(), Some("scripted-model"));
    assert_eq!(stored.search_keywords, vec![vec!["blue".to_string(), "hoodie".to_string()]]);
}

#[tokio::test]
async fn test_resume_after_complete_is_idempotent() {
    let model = ScriptedModel::new(vec![
        calls(&[("call_search", "search_products", HOODIE_SEARCH)]),
        text("Top picks: Blue Zip Hoodie."),
    ]);
    let ctx = TestContext::new(model.clone(), hoodie_providers());
    let session = ctx.session().await;

    let first = ctx
        .engine()
        .send_message(ctx.user_id, session.id, "blue hoodie please")
        .await
        .expect("send message");
    ctx.engine()
        .resume(ctx.user_id, first.interaction_id)
        .await
        .expect("resume");
    let before = ctx
        .store
        .find_interaction(first.interaction_id)
        .await
        .expect("find")
        .expect("exists");

    let again = ctx
        .engine()
        .resume(ctx.user_id, first.interaction_id)
        .await
        .expect("second resume");

    assert_eq!(again.next, "complete");
    assert!(again.message.is_none());
    assert_eq!(model.requests().len(), 2);
    let after = ctx
        .store
        .find_interaction(first.interaction_id)
        .await
        .expect("find")
        .expect("exists");
    assert_eq!(before, after);
}

#[tokio::test]
async fn test_overlapping_resumes_both_succeed() {
    let cart = r#"{"productId":"amazon:B0HOODIE1"}"#;
    let model = ScriptedModel::slow(
        vec![
            calls(&[("call_search", "search_products", HOODIE_SEARCH)]),
            calls(&[("call_cart_a", "add_to_cart", cart)]),
            calls(&[("call_cart_b", "add_to_cart", cart)]),
            text("Top picks: Blue Zip Hoodie."),
            text("Top picks: Blue Zip Hoodie."),
        ],
        std::time::Duration::from_millis(50),
    );
    let ctx = TestContext::new(model, hoodie_providers());
    let session = ctx.session().await;

    let first = ctx
        .engine()
        .send_message(ctx.user_id, session.id, "blue hoodie please")
        .await
        .expect("send message");
    assert_eq!(first.next, "secondary_step");

    let (a, b) = tokio::join!(
        ctx.engine().resume(ctx.user_id, first.interaction_id),
        ctx.engine().resume(ctx.user_id, first.interaction_id),
    );
    let a = a.expect("first resume");
    let b = b.expect("second resume");

    assert_eq!(a.next, "complete");
    assert_eq!(b.next, "complete");
    assert_eq!(
        [&a, &b].iter().filter(|r| r.message.is_some()).count(),
        1,
        "exactly one resume finishes the step"
    );

    assert_eq!(ctx.store.product_count().await, 3);
    let saved = ctx
        .store
        .list_saved_items(ctx.user_id, SavedList::Cart)
        .await
        .expect("list cart");
    assert_eq!(saved.len(), 1);

    let stored = ctx
        .store
        .find_interaction(first.interaction_id)
        .await
        .expect("find")
        .expect("exists");
    assert_eq!(stored.next, "complete");
}

// =============================================================================
// Deferred Providers
// =============================================================================

#[tokio::test]
async fn test_deferred_provider_searched_on_resume() {
    let providers = hoodie_providers();
    let noon = providers[1].clone();
    let model = ScriptedModel::new(vec![
        calls(&[("call_search", "search_products", HOODIE_SEARCH)]),
        text("Top picks across Amazon and noon."),
    ]);
    let ctx = TestContext::staged(
        model.clone(),
        providers,
        vec![Platform::Amazon],
        vec![Platform::Noon],
    );
    let session = ctx.session().await;

    let first = ctx
        .engine()
        .send_message(ctx.user_id, session.id, "find me a blue hoodie under 50")
        .await
        .expect("send message");
    assert_eq!(first.next, "secondary_search");
    assert!(first.products.contains_key(&Platform::Amazon));
    assert!(!first.products.contains_key(&Platform::Noon));
    assert_eq!(noon.searches(), 0);

    let second = ctx
        .engine()
        .resume(ctx.user_id, first.interaction_id)
        .await
        .expect("secondary search");
    assert_eq!(second.next, "secondary_step");
    assert_eq!(second.products.get(&Platform::Noon).map(Vec::len), Some(1));
    assert_eq!(model.requests().len(), 1);

    let query = noon.queries().pop().expect("noon searched");
    assert_eq!(query.keywords, vec!["blue".to_string(), "hoodie".to_string()]);
    assert_eq!(query.max_price, Some(Decimal::new(50, 0)));

    let third = ctx
        .engine()
        .resume(ctx.user_id, first.interaction_id)
        .await
        .expect("secondary step");
    assert_eq!(third.next, "complete");

    let stored = ctx
        .store
        .find_interaction(first.interaction_id)
        .await
        .expect("find")
        .expect("exists");
    assert!(stored.provider_results.contains_key(&Platform::Amazon));
    assert!(stored.provider_results.contains_key(&Platform::Noon));
}

// =============================================================================
// Tool Calls
// =============================================================================

#[tokio::test]
async fn test_tool_results_follow_call_order() {
    let amazon = StubProvider::with_detail(
        Platform::Amazon,
        vec![],
        cartwise_assistant::models::ProductDetail {
            brand: Some("Acme".to_string()),
            ..Default::default()
        },
    );
    let model = ScriptedModel::new(vec![
        calls(&[
            ("call_a", "display_products", r#"{"productIds":["amazon:B0HOODIE1"]}"#),
            ("call_b", "get_product_details", r#"{"productId":"amazon:B0HOODIE1"}"#),
            ("call_c", "not_a_tool", "{}"),
        ]),
        text("Here it is."),
    ]);
    let ctx = TestContext::new(model.clone(), vec![amazon]);
    ctx.store
        .upsert_products(&[product(Platform::Amazon, "B0HOODIE1", "Blue Zip Hoodie", 45)])
        .await
        .expect("seed product");
    let session = ctx.session().await;

    let result = ctx
        .engine()
        .send_message(ctx.user_id, session.id, "show me the zip hoodie")
        .await
        .expect("send message");
    assert_eq!(result.next, "complete");
    assert_eq!(result.message.as_deref(), Some("Here it is."));
    assert_eq!(result.displayed.len(), 1);

    let second_call = &model.requests()[1].messages;
    let tool_ids: Vec<&str> = second_call
        .iter()
        .filter(|m| m.role == Role::Tool)
        .filter_map(|m| m.tool_call_id.as_deref())
        .collect();
    assert_eq!(tool_ids, ["call_a", "call_b", "call_c"]);

    let details = second_call
        .iter()
        .find(|m| m.tool_call_id.as_deref() == Some("call_b"))
        .and_then(|m| m.content.clone())
        .expect("details result");
    assert!(details.contains("Acme"));

    let stored = ctx
        .store
        .find_ordered(session.id)
        .await
        .expect("find ordered");
    let names: Vec<&str> = stored[0].tool_calls.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, ["display_products", "get_product_details", "not_a_tool"]);
    assert!(stored[0].tool_calls[2].is_error);
    assert_eq!(stored[0].tool_calls[2].result_text(), "Tool not_a_tool not found");
}

#[tokio::test]
async fn test_only_first_search_runs() {
    let providers = hoodie_providers();
    let amazon = providers[0].clone();
    let model = ScriptedModel::new(vec![calls(&[
        ("call_1", "search_products", r#"{"keywords":["blue","hoodie"]}"#),
        ("call_2", "search_products", r#"{"keywords":["red","hoodie"]}"#),
    ])]);
    let ctx = TestContext::new(model, providers);
    let session = ctx.session().await;

    let result = ctx
        .engine()
        .send_message(ctx.user_id, session.id, "hoodies")
        .await
        .expect("send message");

    assert_eq!(result.next, "secondary_step");
    assert_eq!(amazon.searches(), 1);
    let stored = ctx
        .store
        .find_interaction(result.interaction_id)
        .await
        .expect("find")
        .expect("exists");
    assert_eq!(stored.tool_calls.len(), 2);
    assert!(stored.tool_calls[1].result_text().starts_with("Ignored"));
    assert_eq!(stored.search_keywords.len(), 1);
}

// =============================================================================
// Failures and Edge Cases
// =============================================================================

#[tokio::test]
async fn test_model_outage_completes_with_fallback() {
    let model = ScriptedModel::new(vec![]);
    let ctx = TestContext::new(model, hoodie_providers());
    let session = ctx.session().await;

    let result = ctx
        .engine()
        .send_message(ctx.user_id, session.id, "hello?")
        .await
        .expect("send message");

    assert_eq!(result.next, "complete");
    assert!(result.message.is_some_and(|m| m.starts_with("Sorry")));
}

#[tokio::test]
async fn test_unknown_marker_resume_is_noop() {
    let model = ScriptedModel::new(vec![text("Hi there!")]);
    let ctx = TestContext::new(model.clone(), hoodie_providers());
    let session = ctx.session().await;
    let first = ctx
        .engine()
        .send_message(ctx.user_id, session.id, "hi")
        .await
        .expect("send message");
    ctx.store
        .overwrite_marker(first.interaction_id, "tertiary_step")
        .await
        .expect("overwrite marker");

    let result = ctx
        .engine()
        .resume(ctx.user_id, first.interaction_id)
        .await
        .expect("resume");

    assert_eq!(result.next, "tertiary_step");
    assert_eq!(result.phase, TurnPhase::Complete);
    assert_eq!(model.requests().len(), 1);
}

#[tokio::test]
async fn test_foreign_user_cannot_resume() {
    let model = ScriptedModel::new(vec![calls(&[(
        "call_search",
        "search_products",
        HOODIE_SEARCH,
    )])]);
    let ctx = TestContext::new(model, hoodie_providers());
    let session = ctx.session().await;
    let first = ctx
        .engine()
        .send_message(ctx.user_id, session.id, "blue hoodie")
        .await
        .expect("send message");

    let err = ctx
        .engine()
        .resume(UserId::generate(), first.interaction_id)
        .await
        .expect_err("foreign resume");

    assert!(matches!(err, TurnError::InteractionNotFound));
}

#[tokio::test]
async fn test_deleted_turn_cannot_resume() {
    let model = ScriptedModel::new(vec![calls(&[(
        "call_search",
        "search_products",
        HOODIE_SEARCH,
    )])]);
    let ctx = TestContext::new(model, hoodie_providers());
    let session = ctx.session().await;
    let first = ctx
        .engine()
        .send_message(ctx.user_id, session.id, "blue hoodie")
        .await
        .expect("send message");
    ctx.store
        .soft_delete_interaction(first.interaction_id)
        .await
        .expect("delete");

    let err = ctx
        .engine()
        .resume(ctx.user_id, first.interaction_id)
        .await
        .expect_err("deleted resume");

    assert!(matches!(err, TurnError::InteractionNotFound));
}
