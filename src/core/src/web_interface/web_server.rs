use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use log::{debug, info};
use warp::{http::StatusCode, reply, Filter, Rejection, Reply};

use super::routes::{health_route, session_route};
use super::types::ApiError;
use crate::error_handling::types::WebError;
use crate::session_management::SessionManager;

/// Web server exposing the session endpoints
pub struct WebServer {
    session_manager: Arc<SessionManager>,
}

impl WebServer {
    /// Create a new WebServer instance
    pub fn new(session_manager: Arc<SessionManager>) -> Self {
        Self { session_manager }
    }

    /// Every route the server answers, with rejections rendered as JSON.
    pub fn routes(&self) -> impl Filter<Extract = impl Reply, Error = Infallible> + Clone {
        health_route()
            .or(session_route(self.session_manager.clone()))
            .recover(handle_rejection)
    }

    /// Serve on `addr` until the process ends
    pub async fn start(&self, addr: SocketAddr) -> Result<(), WebError> {
        // Bind once up front so a taken port is reported instead of aborting.
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| WebError::BindFailed(format!("{}: {}", addr, e)))?;
        drop(listener);

        info!("Web server listening on {}", addr);
        warp::serve(self.routes()).run(addr).await;
        Ok(())
    }
}

async fn handle_rejection(err: Rejection) -> Result<impl Reply, Infallible> {
    let (status, message) = if err.is_not_found() {
        (StatusCode::NOT_FOUND, String::from("Not found"))
    } else {
        debug!("Rejected request: {:?}", err);
        (StatusCode::BAD_REQUEST, String::from("Bad request"))
    };
    Ok(reply::with_status(
        reply::json(&ApiError { message }),
        status,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::configuration::types::SessionConfig;
    use crate::container_management::DockerEngine;
    use crate::configuration::types::RuntimeConfig;

    fn server() -> WebServer {
        let runtime = DockerEngine::new(&RuntimeConfig::default()).unwrap();
        WebServer::new(Arc::new(SessionManager::new(
            Arc::new(runtime),
            SessionConfig::default(),
        )))
    }

    #[tokio::test]
    async fn health_reports_ok() {
        let res = warp::test::request()
            .method("GET")
            .path("/health")
            .reply(&server().routes())
            .await;
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(res.body().as_ref(), br#"{"status":"ok"}"#);
    }

    #[tokio::test]
    async fn unknown_session_kind_is_not_found() {
        let res = warp::test::request()
            .method("GET")
            .path("/ws/shell/web")
            .reply(&server().routes())
            .await;
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn session_route_requires_websocket_upgrade() {
        let res = warp::test::request()
            .method("GET")
            .path("/ws/logs/web")
            .reply(&server().routes())
            .await;
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    }
}
