//! Drive the reception over real TCP.

use std::time::Duration;

use reqwest::StatusCode;
use service_supervisor::reception::{CommandResponse, ReceptionServer, StatusResponse};
use service_supervisor::service::{Service, ServiceCommand, ServiceOptions, ServiceState};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

struct Running {
    base: String,
    service: Service,
    cancel: CancellationToken,
    server: JoinHandle<Result<(), service_supervisor::reception::ReceptionError>>,
    client: reqwest::Client,
}

impl Running {
    async fn start() -> Self {
        let service = Service::new(ServiceOptions::new(
            ServiceCommand::new("sleep").arg("30"),
            |_| {},
            |_| {},
        ));
        let cancel = CancellationToken::new();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());

        let server = tokio::spawn(
            ReceptionServer::new(service.clone(), cancel.clone()).serve(listener),
        );

        Self {
            base,
            service,
            cancel,
            server,
            client: reqwest::Client::new(),
        }
    }

    async fn status(&self) -> StatusResponse {
        self.client
            .get(format!("{}/api/status", self.base))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap()
    }

    async fn command(&self, path: &str) -> (StatusCode, CommandResponse) {
        let response = self
            .client
            .post(format!("{}{path}", self.base))
            .send()
            .await
            .unwrap();
        let status = response.status();
        (status, response.json().await.unwrap())
    }

    async fn shutdown(self) {
        let Self {
            service,
            cancel,
            server,
            client,
            ..
        } = self;
        drop(client);
        if service.is_running() {
            let _ = service.terminate().await;
        }
        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(5), server)
            .await
            .expect("server did not shut down")
            .unwrap()
            .unwrap();
    }
}

#[tokio::test]
async fn api_controls_the_service() {
    let running = Running::start().await;

    let status = running.status().await;
    assert!(!status.running);
    assert_eq!(status.state, ServiceState::Idle);
    assert!(status.pid.is_none());

    let (code, body) = running.command("/api/start").await;
    assert_eq!(code, StatusCode::OK);
    assert!(body.success);

    let status = running.status().await;
    assert!(status.running);
    assert_eq!(status.state, ServiceState::Started);
    let first_pid = status.pid.expect("pid while started");

    let (code, body) = running.command("/api/start").await;
    assert_eq!(code, StatusCode::CONFLICT);
    assert!(!body.success);
    assert_eq!(body.error.as_deref(), Some("Service already running"));

    let (code, _) = running.command("/api/restart").await;
    assert_eq!(code, StatusCode::OK);
    let status = running.status().await;
    assert!(status.running);
    assert_ne!(status.pid, Some(first_pid));

    let (code, body) = running.command("/api/stop").await;
    assert_eq!(code, StatusCode::OK);
    assert!(body.success);
    assert!(!running.status().await.running);

    let (code, body) = running.command("/api/stop").await;
    assert_eq!(code, StatusCode::CONFLICT);
    assert_eq!(body.error.as_deref(), Some("Service not running"));

    running.shutdown().await;
}

#[tokio::test]
async fn restart_starts_an_idle_service() {
    let running = Running::start().await;

    let (code, _) = running.command("/api/restart").await;
    assert_eq!(code, StatusCode::OK);
    assert!(running.service.is_running());

    running.shutdown().await;
}

#[tokio::test]
async fn html_forms_redirect_to_status_page() {
    let running = Running::start().await;

    let page = running
        .client
        .get(format!("{}/", running.base))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert!(page.contains("Service is not running"));

    // The 303 is followed back to the status page.
    let response = running
        .client
        .post(format!("{}/start", running.base))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.url().path(), "/");
    assert!(response.text().await.unwrap().contains("Service is running"));

    let response = running
        .client
        .post(format!("{}/start", running.base))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert!(response
        .text()
        .await
        .unwrap()
        .contains("Service already running"));

    let response = running
        .client
        .post(format!("{}/stop", running.base))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response
        .text()
        .await
        .unwrap()
        .contains("Service is not running"));

    running.shutdown().await;
}
