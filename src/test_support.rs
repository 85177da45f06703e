// In-process stand-in for the Grafana HTTP API used by tests
use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

pub const PNG_BYTES: &[u8] = b"\x89PNG\r\n\x1a\nfake-image";

/// Metadata envelope with the given `panels` array
pub fn dashboard_json(panels: Value) -> Value {
    json!({
        "meta": { "slug": "" },
        "dashboard": {
            "title": "Reef Overview",
            "description": "Water quality & stability",
            "uid": "reef-overview",
            "time": { "from": "now-6h", "to": "now" },
            "templating": {
                "list": [{ "name": "tank", "current": { "text": "Reef", "value": "reef" } }]
            },
            "panels": panels
        }
    })
}

#[derive(Debug, Clone)]
pub struct RenderRequest {
    pub path: String,
    pub query: HashMap<String, String>,
    pub authorization: Option<String>,
}

#[derive(Clone)]
pub struct FakeGrafana {
    dashboard: Arc<Value>,
    dashboard_status: u16,
    // Status codes per panel id, one per attempt; the last one repeats
    scripts: Arc<HashMap<i64, Vec<u16>>>,
    dashboard_hits: Arc<Mutex<usize>>,
    render_hits: Arc<Mutex<HashMap<i64, usize>>>,
    render_requests: Arc<Mutex<Vec<RenderRequest>>>,
}

impl FakeGrafana {
    pub fn new(dashboard: Value) -> Self {
        Self {
            dashboard: Arc::new(dashboard),
            dashboard_status: 200,
            scripts: Arc::new(HashMap::new()),
            dashboard_hits: Arc::new(Mutex::new(0)),
            render_hits: Arc::new(Mutex::new(HashMap::new())),
            render_requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_dashboard_status(mut self, status: u16) -> Self {
        self.dashboard_status = status;
        self
    }

    pub fn with_script(mut self, panel_id: i64, statuses: Vec<u16>) -> Self {
        Arc::make_mut(&mut self.scripts).insert(panel_id, statuses);
        self
    }

    /// Serve on an ephemeral local port and return the base URL
    pub async fn start(&self) -> String {
        let router = Router::new()
            .route("/api/dashboards/uid/:name", get(dashboard))
            .route("/api/dashboards/db/:name", get(dashboard))
            .route("/render/d-solo/:uid", get(render))
            .route("/render/dashboard-solo/db/:uid", get(render))
            .with_state(self.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind fake grafana");
        let addr = listener.local_addr().expect("fake grafana address");
        tokio::spawn(async move {
            axum::serve(listener, router).await.expect("fake grafana server");
        });
        format!("http://{}", addr)
    }

    pub fn dashboard_hits(&self) -> usize {
        *self.dashboard_hits.lock().unwrap()
    }

    pub fn render_hits(&self, panel_id: i64) -> usize {
        self.render_hits
            .lock()
            .unwrap()
            .get(&panel_id)
            .copied()
            .unwrap_or(0)
    }

    pub fn render_requests(&self) -> Vec<RenderRequest> {
        self.render_requests.lock().unwrap().clone()
    }
}

async fn dashboard(State(fake): State<FakeGrafana>, Path(_name): Path<String>) -> Response {
    *fake.dashboard_hits.lock().unwrap() += 1;
    if fake.dashboard_status != 200 {
        return scripted_failure(fake.dashboard_status);
    }
    Json(fake.dashboard.as_ref().clone()).into_response()
}

async fn render(
    State(fake): State<FakeGrafana>,
    Path(uid): Path<String>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Response {
    let panel_id = query
        .get("panelId")
        .and_then(|id| id.parse::<i64>().ok())
        .unwrap_or(-1);

    let attempt = {
        let mut hits = fake.render_hits.lock().unwrap();
        let count = hits.entry(panel_id).or_insert(0);
        *count += 1;
        *count - 1
    };

    fake.render_requests.lock().unwrap().push(RenderRequest {
        path: uid,
        query,
        authorization: headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
    });

    let status = fake
        .scripts
        .get(&panel_id)
        .and_then(|statuses| statuses.get(attempt).or(statuses.last()).copied())
        .unwrap_or(200);

    if status == 200 {
        ([(header::CONTENT_TYPE, "image/png")], PNG_BYTES).into_response()
    } else {
        scripted_failure(status)
    }
}

fn scripted_failure(status: u16) -> Response {
    let code = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (code, format!("scripted failure {}", status)).into_response()
}
