//! Redirect following.
//!
//! The network step sends each hop on a fresh transport and asks
//! [`Redirects`] whether the response points somewhere else. `301`, `302`
//! and `303` turn into a bodiless `GET` (a `HEAD` stays `HEAD`); `307` and
//! `308` resend the same method and body, which is only possible when the
//! body is buffered.

use http::header::{
    AUTHORIZATION, CONTENT_LENGTH, CONTENT_TYPE, COOKIE, HOST, LOCATION, PROXY_AUTHORIZATION,
    REFERER, TRANSFER_ENCODING, WWW_AUTHENTICATE,
};
use http::{HeaderMap, HeaderValue, Method, StatusCode, Uri};
use url::Url;

use crate::ClientError;
use crate::transport::TransportBody;

/// Redirects followed per call unless the client sets its own limit.
pub(crate) const DEFAULT_MAX_REDIRECTS: usize = 10;

/// Where the next hop goes and how it is sent.
#[derive(Debug, PartialEq, Eq)]
pub(crate) struct Redirect {
    pub(crate) uri: Uri,
    pub(crate) method: Method,
    keeps_body: bool,
}

/// Redirect state for one call.
#[derive(Debug)]
pub(crate) struct Redirects {
    limit: usize,
    followed: usize,
    origin_host: Option<String>,
    caller_referer: Option<HeaderValue>,
    replay: Option<TransportBody>,
}

impl Redirects {
    /// Start tracking a call whose first hop is `request`.
    pub(crate) fn new(limit: usize, request: &http::Request<TransportBody>) -> Self {
        Self {
            limit,
            followed: 0,
            origin_host: request.uri().host().map(str::to_ascii_lowercase),
            caller_referer: request.headers().get(REFERER).cloned(),
            replay: request.body().try_clone(),
        }
    }

    /// Decide whether the response to `request` should be followed.
    ///
    /// `None` means the response is final: it is not a redirect, it has no
    /// `Location`, following is disabled, or a `307`/`308` would have to
    /// resend a streamed body.
    pub(crate) fn next(
        &self,
        request: &http::Request<TransportBody>,
        status: StatusCode,
        headers: &HeaderMap,
    ) -> Result<Option<Redirect>, ClientError> {
        if self.limit == 0 {
            return Ok(None);
        }
        let Some(redirect) = resolve(request.method(), request.uri(), status, headers)? else {
            return Ok(None);
        };
        if redirect.keeps_body && self.replay.is_none() {
            return Ok(None);
        }
        if self.followed >= self.limit {
            return Err(ClientError::Transport(format!(
                "stopped after {} redirects",
                self.limit
            )));
        }
        Ok(Some(redirect))
    }

    /// Rewrite `request` in place for the next hop.
    pub(crate) fn apply(&mut self, request: &mut http::Request<TransportBody>, redirect: Redirect) {
        self.followed += 1;

        let previous = std::mem::replace(request.uri_mut(), redirect.uri);
        *request.method_mut() = redirect.method;
        *request.body_mut() = match &self.replay {
            Some(body) if redirect.keeps_body => body.try_clone().unwrap_or_default(),
            _ => TransportBody::empty(),
        };

        let trusted = self.trusts(request.uri());
        let next_referer = referer(&previous, request.uri(), self.caller_referer.as_ref());
        let headers = request.headers_mut();
        headers.remove(HOST);
        headers.remove(PROXY_AUTHORIZATION);
        if !redirect.keeps_body {
            headers.remove(CONTENT_TYPE);
            headers.remove(CONTENT_LENGTH);
            headers.remove(TRANSFER_ENCODING);
        }
        if !trusted {
            headers.remove(AUTHORIZATION);
            headers.remove(WWW_AUTHENTICATE);
            headers.remove(COOKIE);
            headers.remove("cookie2");
        }

        match next_referer {
            Some(value) => {
                headers.insert(REFERER, value);
            }
            None => {
                headers.remove(REFERER);
            }
        }
    }

    /// Credentials follow only to the original host and its subdomains.
    fn trusts(&self, dst: &Uri) -> bool {
        let (Some(origin), Some(host)) = (self.origin_host.as_deref(), dst.host()) else {
            return false;
        };
        let host = host.to_ascii_lowercase();
        host == origin
            || host
                .strip_suffix(origin)
                .is_some_and(|prefix| prefix.ends_with('.'))
    }
}

/// Resolve the redirect target of a response, if it has one.
fn resolve(
    method: &Method,
    current: &Uri,
    status: StatusCode,
    headers: &HeaderMap,
) -> Result<Option<Redirect>, ClientError> {
    let keeps_body = match status {
        StatusCode::MOVED_PERMANENTLY | StatusCode::FOUND | StatusCode::SEE_OTHER => false,
        StatusCode::TEMPORARY_REDIRECT | StatusCode::PERMANENT_REDIRECT => true,
        _ => return Ok(None),
    };
    let Some(location) = headers.get(LOCATION) else {
        return Ok(None);
    };

    let location = location
        .to_str()
        .map_err(|e| ClientError::Transport(format!("invalid redirect location: {e}")))?;
    let mut target = Url::parse(&current.to_string())
        .and_then(|base| base.join(location))
        .map_err(|e| {
            ClientError::Transport(format!("invalid redirect location {location:?}: {e}"))
        })?;
    if !matches!(target.scheme(), "http" | "https") {
        return Err(ClientError::Transport(format!(
            "refusing redirect to unsupported scheme {:?}",
            target.scheme()
        )));
    }
    target.set_fragment(None);

    let uri = target.as_str().parse::<Uri>().map_err(|e| {
        ClientError::Transport(format!("invalid redirect location {location:?}: {e}"))
    })?;
    let method = if keeps_body || *method == Method::GET || *method == Method::HEAD {
        method.clone()
    } else {
        Method::GET
    };

    Ok(Some(Redirect {
        uri,
        method,
        keeps_body,
    }))
}

/// The `Referer` for a hop from `previous` to `next`.
///
/// Never sent from `https` to `http`. A caller-supplied value wins over the
/// previous URL, which is sent without credentials or fragment.
fn referer(previous: &Uri, next: &Uri, caller: Option<&HeaderValue>) -> Option<HeaderValue> {
    if previous.scheme_str() == Some("https") && next.scheme_str() == Some("http") {
        return None;
    }
    if let Some(value) = caller {
        return Some(value.clone());
    }

    let mut url = Url::parse(&previous.to_string()).ok()?;
    url.set_username("").ok()?;
    url.set_password(None).ok()?;
    url.set_fragment(None);
    HeaderValue::from_str(url.as_str()).ok()
}
