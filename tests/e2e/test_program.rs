use crate::e2e::helpers;

use helpers::TestContext;
use hyper::StatusCode;
use serde_json::json;
use test_context::test_context;

#[test_context(TestContext)]
#[tokio::test]
async fn it_should_require_intro_and_outro_keys(ctx: &TestContext) {
    // no configured defaults in the test app
    let response = ctx.client.post("/tts/s1/program", &json!({})).await.unwrap();

    response.assert_status(StatusCode::BAD_REQUEST);
    response.assert_error_message("introKey");
}

#[test_context(TestContext)]
#[tokio::test]
async fn it_should_return_not_found_before_merged_audio_exists(ctx: &TestContext) {
    let response = ctx
        .client
        .post(
            "/tts/nobody/program",
            &json!({ "introKey": "assets/intro.mp3", "outroKey": "assets/outro.mp3" }),
        )
        .await
        .unwrap();

    response.assert_status(StatusCode::NOT_FOUND);
}

#[test_context(TestContext)]
#[tokio::test]
async fn it_should_reject_malformed_program_requests(ctx: &TestContext) {
    let response = ctx.client.post_raw("/tts/s1/program", "{ nope").await.unwrap();

    response.assert_status(StatusCode::BAD_REQUEST);
}
