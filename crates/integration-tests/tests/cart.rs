//! Cart and display scenarios.

use cartwise_assistant::db::{InteractionLog, ProductStore, SavedItemStore};
use cartwise_core::{Platform, SavedList};
use cartwise_integration_tests::{
    ScriptedModel, StubProvider, TestContext, calls, product, text,
};
use rust_decimal::Decimal;

async fn seeded(model: std::sync::Arc<ScriptedModel>) -> TestContext {
    let ctx = TestContext::new(
        model,
        vec![
            StubProvider::returning(Platform::Amazon, vec![]),
            StubProvider::returning(Platform::Noon, vec![]),
        ],
    );
    ctx.store
        .upsert_products(&[
            product(Platform::Amazon, "ASIN123", "Blue Zip Hoodie", 45),
            product(Platform::Noon, "N12345", "Sky Blue Hoodie", 49),
        ])
        .await
        .expect("seed products");
    ctx
}

#[tokio::test]
async fn test_add_to_cart_snapshots_by_value() {
    let model = ScriptedModel::new(vec![
        calls(&[("call_cart", "add_to_cart", r#"{"productId":"ASIN123"}"#)]),
        text("Added the Blue Zip Hoodie to your cart."),
    ]);
    let ctx = seeded(model).await;
    let session = ctx.session().await;

    let result = ctx
        .engine()
        .send_message(ctx.user_id, session.id, "add the zip hoodie to my cart")
        .await
        .expect("send message");

    assert_eq!(result.added_to_cart.len(), 1);
    assert_eq!(result.added_to_cart[0].external_id, "ASIN123");

    // A later price change in the cache leaves the snapshot alone.
    let mut repriced = product(Platform::Amazon, "ASIN123", "Blue Zip Hoodie v2", 99);
    repriced.currency = "USD".to_string();
    ctx.store
        .upsert_products(&[repriced])
        .await
        .expect("reprice");

    let cart = ctx
        .store
        .list_saved_items(ctx.user_id, SavedList::Cart)
        .await
        .expect("list cart");
    assert_eq!(cart.len(), 1);
    assert_eq!(cart[0].price, Decimal::new(45, 0));
    assert_eq!(cart[0].name, "Blue Zip Hoodie");
    assert_eq!(cart[0].currency, "AED");

    let stored = ctx
        .store
        .find_interaction(result.interaction_id)
        .await
        .expect("find")
        .expect("exists");
    assert_eq!(stored.added_to_cart.len(), 1);
    assert_eq!(stored.added_to_cart[0].platform, Platform::Amazon);
}

#[tokio::test]
async fn test_repeated_add_keeps_one_entry() {
    let model = ScriptedModel::new(vec![
        calls(&[("call_1", "add_to_cart", r#"{"productId":"amazon:ASIN123"}"#)]),
        text("Done."),
        calls(&[(
            "call_2",
            "add_to_cart",
            r#"{"productIds":["ASIN123","noon:N12345","missing-id"]}"#,
        )]),
        text("Done again."),
    ]);
    let ctx = seeded(model.clone()).await;
    let session = ctx.session().await;

    ctx.engine()
        .send_message(ctx.user_id, session.id, "add it")
        .await
        .expect("first add");
    ctx.engine()
        .send_message(ctx.user_id, session.id, "add both")
        .await
        .expect("second add");

    let cart = ctx
        .store
        .list_saved_items(ctx.user_id, SavedList::Cart)
        .await
        .expect("list cart");
    assert_eq!(cart.len(), 2);

    let second_turn = &model.requests()[3].messages;
    let result = second_turn
        .iter()
        .find(|m| m.tool_call_id.as_deref() == Some("call_2"))
        .and_then(|m| m.content.clone())
        .expect("cart result");
    assert_eq!(
        result,
        "Added to cart: Sky Blue Hoodie. Already in cart: Blue Zip Hoodie. Not found: missing-id"
    );
}

#[tokio::test]
async fn test_display_omits_unknown_and_duplicate_ids() {
    let model = ScriptedModel::new(vec![
        calls(&[(
            "call_show",
            "display_products",
            r#"{"productIds":["amazon:ASIN123","amazon:nope","ASIN123","noon:N12345"]}"#,
        )]),
        text("Here they are."),
    ]);
    let ctx = seeded(model.clone()).await;
    let session = ctx.session().await;

    let result = ctx
        .engine()
        .send_message(ctx.user_id, session.id, "show them")
        .await
        .expect("send message");

    let shown: Vec<&str> = result
        .displayed
        .iter()
        .map(|p| p.external_id.as_str())
        .collect();
    assert_eq!(shown, ["ASIN123", "N12345"]);

    let tool_result = model.requests()[1]
        .messages
        .iter()
        .find(|m| m.tool_call_id.as_deref() == Some("call_show"))
        .and_then(|m| m.content.clone())
        .expect("display result");
    assert!(tool_result.starts_with("Displayed 2 products"));
}
