//! Integration tests for the gateway HTTP surface.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;

use pyfunc_gateway::config::Config;
use pyfunc_gateway::publish::EndpointPublisher;
use pyfunc_gateway::reconcile::Reconciler;
use pyfunc_gateway::registry::Stage;
use pyfunc_gateway::routes;
use pyfunc_gateway::schema::{Dtype, SchemaField};
use pyfunc_gateway::serving::{HandlerRegistry, GLOBAL_ERROR_KEY};
use pyfunc_gateway::state::AppState;
use pyfunc_gateway::test_util::{descriptor, version, MockRegistryClient, StubHandlerFactory};
use pyfunc_gateway::ModelDescriptor;

struct Gateway {
    app: Router,
    client: Arc<MockRegistryClient>,
    factory: Arc<StubHandlerFactory>,
    reconciler: Arc<Reconciler>,
}

fn gateway(
    models: Vec<ModelDescriptor>,
    input_schema: Vec<SchemaField>,
    prediction: Value,
    tokens: Vec<String>,
) -> Gateway {
    let client = Arc::new(MockRegistryClient::new(models));
    let factory = Arc::new(StubHandlerFactory::new(input_schema, prediction));
    let handlers = Arc::new(HandlerRegistry::new());
    let publisher = Arc::new(EndpointPublisher::new());
    let reconciler = Arc::new(Reconciler::new(
        client.clone(),
        handlers.clone(),
        publisher.clone(),
        factory.clone(),
        false,
        vec![],
        1,
    ));

    let mut config = Config::default();
    config.auth.tokens = tokens;

    let state = Arc::new(AppState::new(config, handlers, publisher, reconciler.clone()));
    let app = routes::router().with_state(state);

    Gateway {
        app,
        client,
        factory,
        reconciler,
    }
}

fn iris_models() -> Vec<ModelDescriptor> {
    vec![descriptor("iris", vec![version(1, "r1", Stage::Production)])]
}

async fn get(app: &Router, uri: &str) -> (StatusCode, Value) {
    let response = app
        .clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    read(response).await
}

async fn read(response: axum::response::Response) -> (StatusCode, Value) {
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn test_iris_scenario() {
    let g = gateway(
        iris_models(),
        vec![SchemaField::tensor("x", Dtype::Float64, vec![1])],
        json!({"y": [0.9]}),
        vec![],
    );
    g.reconciler.reconcile().await;

    let (status, body) = get(&g.app, "/models").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!(["iris"]));

    let response = g
        .app
        .clone()
        .oneshot(post_json("/iris", json!({"x": [0.5]})))
        .await
        .unwrap();
    let (status, body) = read(response).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["y"], json!([0.9]));
    assert_eq!(body["version"], json!([1]));
    assert_eq!(body["run_id"], json!(["r1"]));
}

#[tokio::test]
async fn test_registry_down_keeps_serving_and_reports_error() {
    let g = gateway(
        iris_models(),
        vec![SchemaField::tensor("x", Dtype::Float64, vec![1])],
        json!({"y": [0.9]}),
        vec![],
    );
    g.reconciler.reconcile().await;

    g.client.set_failure("registry offline").await;
    g.reconciler.reconcile().await;

    let (status, errors) = get(&g.app, "/errors").await;
    assert_eq!(status, StatusCode::OK);
    assert!(errors[GLOBAL_ERROR_KEY]
        .as_str()
        .unwrap()
        .contains("registry offline"));

    // The previously published route keeps returning correct results.
    let response = g
        .app
        .clone()
        .oneshot(post_json("/iris", json!({"x": [0.5]})))
        .await
        .unwrap();
    let (status, body) = read(response).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["run_id"], json!(["r1"]));
}

#[tokio::test]
async fn test_version_switch_rebinds_route() {
    let g = gateway(
        iris_models(),
        vec![SchemaField::tensor("x", Dtype::Float64, vec![1])],
        json!({"y": [0.9]}),
        vec![],
    );
    g.reconciler.reconcile().await;

    g.client
        .set_models(vec![descriptor(
            "iris",
            vec![version(2, "r2", Stage::Production)],
        )])
        .await;
    g.reconciler.reconcile().await;

    let (_, names) = get(&g.app, "/models").await;
    assert_eq!(names, json!(["iris"]));

    let response = g
        .app
        .clone()
        .oneshot(post_json("/iris", json!({"x": [0.5]})))
        .await
        .unwrap();
    let (status, body) = read(response).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["version"], json!([2]));
    assert_eq!(body["run_id"], json!(["r2"]));
    assert_eq!(g.factory.build_count(), 2);
}

#[tokio::test]
async fn test_input_less_model_served_over_get() {
    let g = gateway(iris_models(), vec![], json!({"y": [1]}), vec![]);
    g.reconciler.reconcile().await;

    let (status, body) = get(&g.app, "/iris").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["run_id"], json!(["r1"]));

    // POST against a GET route is rejected.
    let response = g
        .app
        .clone()
        .oneshot(post_json("/iris", json!({})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test]
async fn test_auth_allow_list() {
    let g = gateway(iris_models(), vec![], json!({"y": [1]}), vec!["secret".to_string()]);
    g.reconciler.reconcile().await;

    // Missing token is challenged.
    let response = g
        .app
        .clone()
        .oneshot(Request::builder().uri("/iris").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(
        response.headers().get(header::WWW_AUTHENTICATE).unwrap(),
        "Bearer"
    );

    // Unknown token is rejected.
    let response = g
        .app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/iris")
                .header(header::AUTHORIZATION, "Bearer wrong")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    // Allowed token succeeds.
    let response = g
        .app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/iris")
                .header(header::AUTHORIZATION, "Bearer secret")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_open_access_with_empty_allow_list() {
    let g = gateway(iris_models(), vec![], json!({"y": [1]}), vec![]);
    g.reconciler.reconcile().await;

    let (status, _) = get(&g.app, "/iris").await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_modelinfo_and_unknown_model() {
    let g = gateway(
        iris_models(),
        vec![SchemaField::tensor("x", Dtype::Float64, vec![1])],
        json!({"y": [1]}),
        vec![],
    );
    g.reconciler.reconcile().await;

    let (status, info) = get(&g.app, "/modelinfo/iris").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(info["name"], "iris");
    assert_eq!(info["version"], 1);
    assert_eq!(info["run_id"], "r1");
    assert!(info["input"].as_array().unwrap().len() == 1);
    // Output schema ends with the provenance fields.
    let output = info["output"].as_array().unwrap();
    assert_eq!(output[output.len() - 2]["name"], "version");
    assert_eq!(output[output.len() - 1]["name"], "run_id");

    let (status, info) = get(&g.app, "/modelinfo/unknown").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(info, json!({}));
}

#[tokio::test]
async fn test_predict_unknown_model_is_404() {
    let g = gateway(iris_models(), vec![], json!({}), vec![]);
    g.reconciler.reconcile().await;

    let (status, _) = get(&g.app, "/nope").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_parse_input_error_is_structured_422() {
    let g = gateway(
        iris_models(),
        vec![SchemaField::tensor("x", Dtype::Int64, vec![1])],
        json!({"y": [1]}),
        vec![],
    );
    g.reconciler.reconcile().await;

    let response = g
        .app
        .clone()
        .oneshot(post_json("/iris", json!({"x": ["abc"]})))
        .await
        .unwrap();
    let (status, body) = read(response).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["detail"][0]["loc"], json!(["Parse input error"]));
}

#[tokio::test]
async fn test_refresh_triggers_reconciliation() {
    let g = gateway(iris_models(), vec![], json!({"y": [1]}), vec![]);

    let response = g
        .app
        .clone()
        .oneshot(Request::builder().uri("/refresh").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // The trigger is fire-and-forget; wait for the spawned run to land.
    for _ in 0..50 {
        if g.factory.build_count() > 0 {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    assert_eq!(g.factory.build_count(), 1);

    let (_, names) = get(&g.app, "/models").await;
    assert_eq!(names, json!(["iris"]));
}
