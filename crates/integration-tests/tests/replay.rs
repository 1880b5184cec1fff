//! History replay over real turns.

use cartwise_assistant::db::InteractionLog;
use cartwise_assistant::llm::Role;
use cartwise_assistant::services::history;
use cartwise_core::Platform;
use cartwise_integration_tests::{
    ScriptedModel, StubProvider, TestContext, calls, product, text,
};

async fn two_turns() -> (TestContext, cartwise_core::SessionId) {
    let model = ScriptedModel::new(vec![
        calls(&[(
            "call_search",
            "search_products",
            r#"{"keywords":["blue","hoodie"]}"#,
        )]),
        text("Top picks: Blue Zip Hoodie."),
        text("You're welcome!"),
    ]);
    let ctx = TestContext::new(
        model,
        vec![StubProvider::returning(
            Platform::Amazon,
            vec![product(Platform::Amazon, "B0HOODIE1", "Blue Zip Hoodie", 45)],
        )],
    );
    let session = ctx.session().await;

    let first = ctx
        .engine()
        .send_message(ctx.user_id, session.id, "blue hoodie")
        .await
        .expect("first turn");
    ctx.engine()
        .resume(ctx.user_id, first.interaction_id)
        .await
        .expect("resume");
    ctx.engine()
        .send_message(ctx.user_id, session.id, "thanks")
        .await
        .expect("second turn");

    (ctx, session.id)
}

#[tokio::test]
async fn test_replay_of_completed_turns() {
    let (ctx, session_id) = two_turns().await;

    let messages = history::replay(ctx.store.as_ref(), session_id)
        .await
        .expect("replay");
    let roles: Vec<Role> = messages.iter().map(|m| m.role).collect();

    assert_eq!(
        roles,
        [
            Role::User,
            Role::Assistant,
            Role::Tool,
            Role::Assistant,
            Role::User,
            Role::Assistant,
        ]
    );
    assert_eq!(messages[1].tool_calls[0].function.name, "search_products");
    assert_eq!(messages[2].tool_call_id.as_deref(), Some("call_search"));
    assert_eq!(
        messages[3].content.as_deref(),
        Some("Top picks: Blue Zip Hoodie.")
    );
    assert_eq!(messages[5].content.as_deref(), Some("You're welcome!"));
}

#[tokio::test]
async fn test_replay_is_deterministic() {
    let (ctx, session_id) = two_turns().await;

    let first = serde_json::to_value(
        history::replay(ctx.store.as_ref(), session_id)
            .await
            .expect("replay"),
    )
    .expect("serialize");
    let second = serde_json::to_value(
        history::replay(ctx.store.as_ref(), session_id)
            .await
            .expect("replay"),
    )
    .expect("serialize");

    assert_eq!(first, second);
}

#[tokio::test]
async fn test_third_turn_sees_prior_history() {
    let model = ScriptedModel::new(vec![text("Hello!"), text("Still here.")]);
    let ctx = TestContext::new(model.clone(), vec![]);
    let session = ctx.session().await;

    ctx.engine()
        .send_message(ctx.user_id, session.id, "hi")
        .await
        .expect("first turn");
    ctx.engine()
        .send_message(ctx.user_id, session.id, "are you there?")
        .await
        .expect("second turn");

    let second = &model.requests()[1].messages;
    let contents: Vec<Option<&str>> = second
        .iter()
        .skip(1)
        .map(|m| m.content.as_deref())
        .collect();
    assert_eq!(
        contents,
        [Some("hi"), Some("Hello!"), Some("are you there?")]
    );
    assert_eq!(second[0].role, Role::System);

    let ordered = ctx
        .store
        .find_ordered(session.id)
        .await
        .expect("find ordered");
    assert!(ordered[0].seq < ordered[1].seq);
}
