//! Session and login middleware
//!
//! Register a [`SessionGate`] as app data, then wrap the app (or a scope) with
//! `from_fn(session_middleware)`. Protected scopes additionally wrap
//! `from_fn(login_required)`, which must run inside the session middleware.

use actix_web::body::MessageBody;
use actix_web::dev::{ServiceRequest, ServiceResponse};
use actix_web::error::ErrorInternalServerError;
use actix_web::middleware::Next;
use actix_web::{web, Error, HttpMessage, HttpRequest};
use log::{debug, warn};
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

use crate::context::{RequestContext, SessionHandle, SharedContext};
use crate::oauth::OAuth2Provider;
use crate::render::Renderer;
use crate::session::{Session, SessionStore};

/// Shared singletons the session middleware hands to every request
pub struct SessionGate {
    store: Arc<dyn SessionStore>,
    cookie_name: String,
    provider: Option<Arc<OAuth2Provider>>,
    renderer: Option<Arc<dyn Renderer>>,
}

impl SessionGate {
    #[must_use]
    pub fn new(store: Arc<dyn SessionStore>, cookie_name: &str) -> Self {
        Self {
            store,
            cookie_name: cookie_name.to_string(),
            provider: None,
            renderer: None,
        }
    }

    #[must_use]
    pub fn with_provider(mut self, provider: OAuth2Provider) -> Self {
        self.provider = Some(Arc::new(provider));
        self
    }

    #[must_use]
    pub fn with_renderer(mut self, renderer: Arc<dyn Renderer>) -> Self {
        self.renderer = Some(renderer);
        self
    }

    #[must_use]
    pub fn cookie_name(&self) -> &str {
        &self.cookie_name
    }

    #[must_use]
    pub fn provider(&self) -> Option<&Arc<OAuth2Provider>> {
        self.provider.as_ref()
    }

    /// Resolve the session for `req` and bundle it with the gate's collaborators
    pub async fn context_for(&self, req: &HttpRequest) -> RequestContext {
        let session = match self.store.get_session(req, &self.cookie_name).await {
            Ok(session) => session,
            Err(e) => {
                warn!("Session lookup failed, continuing with a fresh session: {e}");
                Session::new(&self.cookie_name, self.store.options().clone())
            }
        };

        let mut ctx = RequestContext::new(session, Arc::clone(&self.store));
        if let Some(provider) = &self.provider {
            ctx = ctx.with_oauth_client(Arc::clone(provider.client()));
        }
        if let Some(renderer) = &self.renderer {
            ctx = ctx.with_renderer(Arc::clone(renderer));
        }
        ctx
    }
}

/// Load the session, run the login flow routes and expiry check, and persist afterwards
///
/// # Errors
///
/// Fails with 500 when no [`SessionGate`] is registered, and propagates errors
/// from downstream services.
pub async fn session_middleware(
    req: ServiceRequest,
    next: Next<impl MessageBody + 'static>,
) -> Result<ServiceResponse<impl MessageBody>, Error> {
    let Some(gate) = req.app_data::<web::Data<SessionGate>>().cloned() else {
        return Err(ErrorInternalServerError("session gate is not configured"));
    };

    let mut ctx = gate.context_for(req.request()).await;

    if let Some(provider) = gate.provider() {
        provider.check_expiry(&mut ctx).await;
        if let Some(mut response) = provider.route(&mut ctx, req.request()).await {
            ctx.finish(&mut response).await;
            return Ok(req.into_response(response).map_into_right_body());
        }
    }

    let shared: SharedContext = Rc::new(RefCell::new(ctx));
    req.extensions_mut().insert(Rc::clone(&shared));

    let mut res = next.call(req).await?;

    res.request().extensions_mut().remove::<SharedContext>();
    let mut ctx = Rc::try_unwrap(shared).map_or_else(
        |still_shared| {
            debug!("Session handle outlived the handler; persisting a snapshot");
            still_shared.borrow().clone()
        },
        RefCell::into_inner,
    );
    ctx.finish(res.response_mut()).await;

    Ok(res.map_into_left_body())
}

/// Redirect to the login route unless the session holds a live token
///
/// # Errors
///
/// Fails with 500 when the session middleware is not installed around it.
pub async fn login_required(
    req: ServiceRequest,
    next: Next<impl MessageBody + 'static>,
) -> Result<ServiceResponse<impl MessageBody>, Error> {
    let Some(gate) = req.app_data::<web::Data<SessionGate>>().cloned() else {
        return Err(ErrorInternalServerError("session gate is not configured"));
    };
    let Some(provider) = gate.provider().cloned() else {
        return Err(ErrorInternalServerError("no OAuth provider is configured"));
    };

    let shared = req.extensions().get::<SharedContext>().cloned();
    let Some(shared) = shared else {
        return Err(ErrorInternalServerError("session middleware is not installed"));
    };

    let redirect = {
        let handle = SessionHandle::new(shared);
        handle.with_session(|session| provider.require_login(session, req.request()))
    };
    if let Some(response) = redirect {
        return Ok(req.into_response(response).map_into_right_body());
    }

    Ok(next.call(req).await?.map_into_left_body())
}
