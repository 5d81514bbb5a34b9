//! Black-box tests: every service started on a real ephemeral port, all
//! traffic driven through the gateway with a plain HTTP client.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use serde_json::{json, Value};
use tokio::task::JoinHandle;

use registra_api::app;
use registra_api::app::services::AppServices;
use registra_api::config::{ServiceKind, Upstreams};
use registra_api::gateway::{self, GatewayState};
use registra_auth::{EnvelopeKey, TokenCodec};
use registra_core::EntityKind;
use registra_infra::executor::insert_records;
use registra_infra::{MemoryStore, MemoryTokenStore, RecordStore, TokenStore};

struct Cluster {
    gateway_url: String,
    client: reqwest::Client,
    envelope: Arc<EnvelopeKey>,
    handles: Vec<JoinHandle<()>>,
}

impl Drop for Cluster {
    fn drop(&mut self) {
        for handle in &self.handles {
            handle.abort();
        }
    }
}

async fn spawn(router: Router) -> (String, SocketAddr, JoinHandle<()>) {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        axum::serve(
            listener,
            router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .unwrap();
    });
    (format!("http://{addr}"), addr, handle)
}

impl Cluster {
    /// Start all six services over one shared in-memory store. The write
    /// services reach the read service over real HTTP, as in a split
    /// deployment. `sabotage_create` points the gateway's create upstream at
    /// a dead port.
    async fn start(sabotage_create: bool) -> Self {
        let codec = TokenCodec::new(b"black-box-secret");
        let store: Arc<dyn RecordStore> = Arc::new(MemoryStore::new());
        let tokens: Arc<dyn TokenStore> = Arc::new(MemoryTokenStore::new());

        // Seeded admin; passwords are hashed on the way in.
        insert_records(
            store.as_ref(),
            EntityKind::Admin,
            vec![json!({"name": "Root", "email": "root@uni.edu", "password": "rootpass"})
                .as_object()
                .unwrap()
                .clone()],
        )
        .await
        .unwrap();

        let local =
            AppServices::assemble(store.clone(), tokens.clone(), codec.clone(), None).unwrap();

        let mut handles = Vec::new();
        let (auth_url, _, handle) = spawn(app::build_app(ServiceKind::Auth, local.clone())).await;
        handles.push(handle);
        let (read_url, _, handle) = spawn(app::build_app(ServiceKind::Read, local.clone())).await;
        handles.push(handle);

        let writers =
            AppServices::assemble(store, tokens, codec.clone(), Some(&read_url)).unwrap();
        let (create_url, _, handle) =
            spawn(app::build_app(ServiceKind::Create, writers.clone())).await;
        handles.push(handle);
        let (update_url, _, handle) =
            spawn(app::build_app(ServiceKind::Update, writers.clone())).await;
        handles.push(handle);
        let (delete_url, _, handle) =
            spawn(app::build_app(ServiceKind::Delete, writers.clone())).await;
        handles.push(handle);

        let envelope = Arc::new(EnvelopeKey::generate());
        let upstreams = Upstreams {
            auth: auth_url,
            read: read_url,
            create: if sabotage_create {
                "http://127.0.0.1:1".to_string()
            } else {
                create_url
            },
            update: update_url,
            delete: delete_url,
        };
        let state =
            Arc::new(GatewayState::new(codec, upstreams, envelope.clone()).unwrap());
        let (gateway_url, _, handle) = spawn(gateway::proxy::router(state)).await;
        handles.push(handle);

        Self {
            gateway_url,
            client: reqwest::Client::new(),
            envelope,
            handles,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.gateway_url)
    }

    async fn login(&self, email: &str, password: &str) -> String {
        let response = self
            .client
            .post(self.url("/auth/login"))
            .json(&json!({"email": email, "password": password}))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 200, "login failed for {email}");
        let body: Value = response.json().await.unwrap();
        body["token"].as_str().unwrap().to_string()
    }

    async fn create(&self, token: &str, table: &str, data: Value) -> reqwest::Response {
        self.client
            .post(self.url("/create"))
            .bearer_auth(token)
            .json(&json!({"table": table, "data": data}))
            .send()
            .await
            .unwrap()
    }
}

#[tokio::test]
async fn full_lifecycle_through_the_gateway() {
    let cluster = Cluster::start(false).await;
    let admin = cluster.login("root@uni.edu", "rootpass").await;

    // whoami
    let me: Value = cluster
        .client
        .get(cluster.url("/auth/me"))
        .bearer_auth(&admin)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(me["user"]["email"], "root@uni.edu");

    // Admin provisions a teacher, a course, and a student.
    let response = cluster
        .create(
            &admin,
            "teacher",
            json!({"name": "Grace", "email": "grace@uni.edu", "password": "hopper1"}),
        )
        .await;
    assert_eq!(response.status(), 201);

    let response = cluster
        .create(
            &admin,
            "course",
            json!({"name": "Algorithms", "teacher_id": 1, "credit_hours": 3}),
        )
        .await;
    assert_eq!(response.status(), 201);

    let response = cluster
        .create(
            &admin,
            "student",
            json!({"name": "Ada", "email": "ada@uni.edu", "password": "hunter22"}),
        )
        .await;
    assert_eq!(response.status(), 201);

    // Students cannot create courses.
    let student = cluster.login("ada@uni.edu", "hunter22").await;
    let response = cluster
        .create(
            &student,
            "course",
            json!({"name": "Hacking", "teacher_id": 1, "credit_hours": 1}),
        )
        .await;
    assert_eq!(response.status(), 403);

    // Enrollment, then the idempotent retry.
    let response = cluster
        .create(&student, "enrollment", json!({"course_id": 1}))
        .await;
    assert_eq!(response.status(), 201);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["inserted"], 1);

    let response = cluster
        .create(&student, "enrollment", json!({"course_id": 1}))
        .await;
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["message"], "already enrolled");
    assert_eq!(body["inserted"], 0);

    // Course reads carry the joined teacher name.
    let body: Value = cluster
        .client
        .get(cluster.url("/read?tableName=course"))
        .bearer_auth(&student)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["data"][0]["teacher_name"], "Grace");
    assert!(body["data"][0].get("password").is_none());

    // The enrolled student blocks course deletion.
    let response = cluster
        .client
        .delete(cluster.url("/delete/course/1"))
        .bearer_auth(&admin)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["message"], "cannot delete course with enrolled students");

    // The student removes their own enrollment; then the delete goes through.
    let response = cluster
        .client
        .delete(cluster.url("/delete"))
        .bearer_auth(&student)
        .json(&json!({"type": "enrollment", "ids": [1]}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    let response = cluster
        .client
        .delete(cluster.url("/delete/course/1"))
        .bearer_auth(&admin)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
}

#[tokio::test]
async fn revoked_tokens_are_refused_everywhere() {
    let cluster = Cluster::start(false).await;
    let token = cluster.login("root@uni.edu", "rootpass").await;

    let response = cluster
        .client
        .post(cluster.url("/auth/logout"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    // Signature still verifies, but the live-token row is gone.
    let response = cluster
        .client
        .get(cluster.url("/auth/me"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 401);

    let response = cluster
        .client
        .get(cluster.url("/read?tableName=course"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 401);
}

#[tokio::test]
async fn encrypted_envelopes_are_unwrapped_at_the_gateway() {
    let cluster = Cluster::start(false).await;
    let admin = cluster.login("root@uni.edu", "rootpass").await;

    let plaintext = json!({
        "table": "teacher",
        "data": {"name": "Grace", "email": "grace@uni.edu", "password": "hopper1"},
    });
    let armored = EnvelopeKey::seal_for(
        &cluster.envelope.public_key(),
        plaintext.to_string().as_bytes(),
    )
    .unwrap();

    let response = cluster
        .client
        .post(cluster.url("/create"))
        .bearer_auth(&admin)
        .json(&json!({ "encrypted": armored }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 201);

    let response = cluster
        .client
        .post(cluster.url("/create"))
        .bearer_auth(&admin)
        .json(&json!({ "encrypted": "garbage" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["message"], "invalid encrypted envelope");
}

#[tokio::test]
async fn unreachable_upstreams_become_a_fixed_502() {
    let cluster = Cluster::start(true).await;
    let admin = cluster.login("root@uni.edu", "rootpass").await;

    let response = cluster
        .create(&admin, "course", json!({"name": "X", "teacher_id": 1, "credit_hours": 1}))
        .await;
    assert_eq!(response.status(), 502);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"], "upstream_unreachable");
}

#[tokio::test]
async fn the_gateway_rate_limits_login_attempts_per_ip() {
    let cluster = Cluster::start(false).await;

    // Distinct emails keep the per-account login throttle out of the way;
    // only the gateway's per-IP budget (10/min for auth) is in play.
    for i in 0..10 {
        let response = cluster
            .client
            .post(cluster.url("/auth/login"))
            .json(&json!({"email": format!("ghost{i}@uni.edu"), "password": "nope"}))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 401);
    }

    let response = cluster
        .client
        .post(cluster.url("/auth/login"))
        .json(&json!({"email": "ghost11@uni.edu", "password": "nope"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 429);
}
