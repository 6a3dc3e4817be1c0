mod common;

use futures::future::join_all;
use pretty_assertions::assert_eq;

use common::TestContext;
use timekeeper::error::AppError;
use timekeeper::store::UserStore;
use timekeeper::tokens::{TokenKey, TokenKind, Transition};

const CONTENDERS: usize = 16;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_signup_verification_succeeds_once() {
    let ctx = TestContext::new();
    let user = ctx
        .state
        .tokens
        .register("a@x.com", "user1", "hash".to_string())
        .await
        .unwrap();
    let token = ctx.token_for("a@x.com", TokenKind::Signup);

    let attempts = (0..CONTENDERS).map(|_| {
        let tokens = ctx.state.tokens.clone();
        let token = token.clone();
        tokio::spawn(async move { tokens.consume(&token, Transition::ConfirmSignup).await })
    });
    let results: Vec<Result<_, AppError>> = join_all(attempts)
        .await
        .into_iter()
        .map(|joined| joined.unwrap())
        .collect();

    let winners = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(winners, 1);
    for result in results.iter().filter_map(|r| r.as_ref().err()) {
        assert!(
            matches!(result, AppError::InvalidToken | AppError::VerificationConflict),
            "unexpected error: {:?}",
            result
        );
    }

    let stored = ctx.state.users.find_by_id(user.id).await.unwrap().unwrap();
    assert!(stored.is_verified());
    assert!(!ctx.backends.tokens.contains(&TokenKey::new(TokenKind::Signup, token)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_password_resets_apply_one_hash() {
    let ctx = TestContext::new();
    ctx.state
        .tokens
        .register("a@x.com", "user1", "hash".to_string())
        .await
        .unwrap();
    let token = ctx
        .state
        .tokens
        .issue("a@x.com", TokenKind::ResetPassword, None)
        .await
        .unwrap();

    let attempts = (0..CONTENDERS).map(|i| {
        let tokens = ctx.state.tokens.clone();
        let token = token.clone();
        tokio::spawn(async move {
            let transition = Transition::ResetPassword {
                password_hash: format!("hash-{}", i),
            };
            tokens.consume(&token, transition).await
        })
    });
    let results: Vec<_> = join_all(attempts)
        .await
        .into_iter()
        .map(|joined| joined.unwrap())
        .collect();

    let winner = results
        .iter()
        .filter_map(|r| r.as_ref().ok())
        .collect::<Vec<_>>();
    assert_eq!(winner.len(), 1);

    let stored = ctx
        .state
        .users
        .find_by_email("a@x.com")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.password_hash, winner[0].password_hash);
    assert_eq!(stored.reset_password_token, None);
}
