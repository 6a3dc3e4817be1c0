#[macro_use]
mod common;

use actix_web::http::StatusCode;
use actix_web::test;
use pretty_assertions::assert_eq;
use serde_json::{json, Value};

use common::{bearer, register_and_login, send, TestContext};

fn timer(id: &str, name: &str, order: i32) -> Value {
    json!({
        "timerId": id,
        "name": name,
        "duration": 60,
        "count": 1,
        "order": order,
        "color": "#ff0000"
    })
}

fn ids(list: &Value, field: &str) -> Vec<String> {
    list.as_array()
        .unwrap()
        .iter()
        .map(|item| item[field].as_str().unwrap().to_string())
        .collect()
}

#[actix_rt::test]
async fn test_save_and_list_timers() {
    let ctx = TestContext::new();
    let app = init_app!(ctx);
    let access = register_and_login(&app, "a@x.com", "user1", "testtest1").await;

    let req = test::TestRequest::get()
        .uri("/api/timers")
        .insert_header(bearer(&access))
        .to_request();
    let reply = send(&app, req).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body, json!([]));

    let req = test::TestRequest::put()
        .uri("/api/timers")
        .insert_header(bearer(&access))
        .set_json(json!({
            "timers": [timer("t2", "Rest", 2), timer("t1", "Focus", 1), timer("t3", "Stretch", 3)]
        }))
        .to_request();
    let reply = send(&app, req).await;
    assert_eq!(reply.status, StatusCode::OK, "body: {}", reply.body);

    let req = test::TestRequest::get()
        .uri("/api/timers")
        .insert_header(bearer(&access))
        .to_request();
    let reply = send(&app, req).await;
    assert_eq!(ids(&reply.body, "timerId"), vec!["t1", "t2", "t3"]);
    assert_eq!(reply.body[0]["name"], "Focus");

    // A save replaces the whole inventory.
    let req = test::TestRequest::put()
        .uri("/api/timers")
        .insert_header(bearer(&access))
        .set_json(json!({ "timers": [timer("t3", "Stretch", 1)] }))
        .to_request();
    send(&app, req).await;

    let req = test::TestRequest::get()
        .uri("/api/timers")
        .insert_header(bearer(&access))
        .to_request();
    let reply = send(&app, req).await;
    assert_eq!(ids(&reply.body, "timerId"), vec!["t3"]);
}

#[actix_rt::test]
async fn test_timer_validation() {
    let ctx = TestContext::new();
    let app = init_app!(ctx);
    let access = register_and_login(&app, "a@x.com", "user1", "testtest1").await;

    let req = test::TestRequest::put()
        .uri("/api/timers")
        .insert_header(bearer(&access))
        .set_json(json!({ "timers": [timer("t1", "A", 1), timer("t1", "B", 2)] }))
        .to_request();
    assert_eq!(send(&app, req).await.status, StatusCode::BAD_REQUEST);

    let mut broken = timer("t1", "A", 1);
    broken["duration"] = json!(0);
    let req = test::TestRequest::put()
        .uri("/api/timers")
        .insert_header(bearer(&access))
        .set_json(json!({ "timers": [broken] }))
        .to_request();
    assert_eq!(send(&app, req).await.status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[actix_rt::test]
async fn test_timers_are_private() {
    let ctx = TestContext::new();
    let app = init_app!(ctx);
    let alice = register_and_login(&app, "a@x.com", "user1", "testtest1").await;
    let bob = register_and_login(&app, "b@x.com", "user2", "testtest1").await;

    let req = test::TestRequest::put()
        .uri("/api/timers")
        .insert_header(bearer(&alice))
        .set_json(json!({ "timers": [timer("t1", "Focus", 1)] }))
        .to_request();
    send(&app, req).await;

    let req = test::TestRequest::get()
        .uri("/api/timers")
        .insert_header(bearer(&bob))
        .to_request();
    assert_eq!(send(&app, req).await.body, json!([]));
}

#[actix_rt::test]
async fn test_routine_lifecycle() {
    let ctx = TestContext::new();
    let app = init_app!(ctx);
    let access = register_and_login(&app, "a@x.com", "user1", "testtest1").await;

    let req = test::TestRequest::put()
        .uri("/api/timers")
        .insert_header(bearer(&access))
        .set_json(json!({ "timers": [timer("t1", "Focus", 1), timer("t2", "Rest", 2)] }))
        .to_request();
    send(&app, req).await;

    let req = test::TestRequest::put()
        .uri("/api/routines")
        .insert_header(bearer(&access))
        .set_json(json!({
            "id": "r1",
            "name": "Pomodoro",
            "count": 4,
            "data": [{ "timerId": "t2" }, { "timerId": "t1" }, { "timerId": "t2" }]
        }))
        .to_request();
    let reply = send(&app, req).await;
    assert_eq!(reply.status, StatusCode::OK, "body: {}", reply.body);
    assert_eq!(ids(&reply.body["data"], "timerId"), vec!["t2", "t1", "t2"]);

    let req = test::TestRequest::get()
        .uri("/api/routines")
        .insert_header(bearer(&access))
        .to_request();
    let reply = send(&app, req).await;
    assert_eq!(reply.body[0]["name"], "Pomodoro");
    assert_eq!(reply.body[0]["count"], 4);

    // Dropping a timer removes it from the routine.
    let req = test::TestRequest::put()
        .uri("/api/timers")
        .insert_header(bearer(&access))
        .set_json(json!({ "timers": [timer("t1", "Focus", 1)] }))
        .to_request();
    send(&app, req).await;

    let req = test::TestRequest::get()
        .uri("/api/routines")
        .insert_header(bearer(&access))
        .to_request();
    let reply = send(&app, req).await;
    assert_eq!(ids(&reply.body[0]["data"], "timerId"), vec!["t1"]);

    let req = test::TestRequest::delete()
        .uri("/api/routines/r1")
        .insert_header(bearer(&access))
        .to_request();
    assert_eq!(send(&app, req).await.status, StatusCode::OK);

    let req = test::TestRequest::delete()
        .uri("/api/routines/r1")
        .insert_header(bearer(&access))
        .to_request();
    assert_eq!(send(&app, req).await.status, StatusCode::NOT_FOUND);
}

#[actix_rt::test]
async fn test_routine_rejects_unknown_timers() {
    let ctx = TestContext::new();
    let app = init_app!(ctx);
    let access = register_and_login(&app, "a@x.com", "user1", "testtest1").await;

    let req = test::TestRequest::put()
        .uri("/api/routines")
        .insert_header(bearer(&access))
        .set_json(json!({
            "id": "r1",
            "name": "Ghost",
            "count": 1,
            "data": [{ "timerId": "missing" }]
        }))
        .to_request();
    assert_eq!(send(&app, req).await.status, StatusCode::BAD_REQUEST);

    let req = test::TestRequest::put()
        .uri("/api/routines")
        .insert_header(bearer(&access))
        .set_json(json!({ "id": "r1", "name": "Empty", "count": 1, "data": [] }))
        .to_request();
    assert_eq!(send(&app, req).await.status, StatusCode::BAD_REQUEST);
}
