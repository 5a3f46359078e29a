//! Local stand-ins for the Bitbucket and Jira REST APIs.

#![allow(dead_code)]

use std::io::Read;
use std::sync::{Arc, Mutex};
use std::thread;

use serde_json::{json, Value};
use tiny_http::{Response, Server};

/// 2024-04-20T00:00:00Z
pub const APR_20: i64 = 1_713_571_200_000;
/// 2024-04-10T00:00:00Z
pub const APR_10: i64 = 1_712_707_200_000;
/// 2024-03-01T00:00:00Z
pub const MAR_01: i64 = 1_709_251_200_000;

pub struct FakeServer {
    pub base: String,
    pub hits: Arc<Mutex<Vec<String>>>,
    /// `Authorization` header of each request, in arrival order.
    pub authorizations: Arc<Mutex<Vec<Option<String>>>>,
}

impl FakeServer {
    /// Serve `route(method, url, body) -> (status, body)` until the process exits.
    pub fn start(route: fn(&str, &str, &str) -> (u16, String)) -> Self {
        let server = Server::http("127.0.0.1:0").expect("bind");
        let addr = server.server_addr().to_ip().expect("ip addr");
        let hits = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&hits);
        let authorizations = Arc::new(Mutex::new(Vec::new()));
        let seen_auth = Arc::clone(&authorizations);
        thread::spawn(move || {
            for mut request in server.incoming_requests() {
                let url = request.url().to_string();
                let method = request.method().to_string();
                let mut body = String::new();
                let _ = request.as_reader().read_to_string(&mut body);
                let authorization = request
                    .headers()
                    .iter()
                    .find(|header| header.field.equiv("Authorization"))
                    .map(|header| header.value.as_str().to_string());
                seen.lock().expect("hits").push(format!("{method} {url}"));
                seen_auth.lock().expect("authorizations").push(authorization);
                let (status, reply) = route(&method, &url, &body);
                let _ = request.respond(Response::from_string(reply).with_status_code(status));
            }
        });
        Self { base: format!("http://{addr}"), hits, authorizations }
    }

    pub fn bitbucket_url(&self) -> String {
        format!("{}/rest/api/1.0", self.base)
    }

    pub fn hits(&self) -> Vec<String> {
        self.hits.lock().expect("hits").clone()
    }

    pub fn authorizations(&self) -> Vec<Option<String>> {
        self.authorizations.lock().expect("authorizations").clone()
    }
}

fn commit(id: &str, ts: i64, message: &str) -> Value {
    json!({
        "id": format!("{id}0000000000"),
        "displayId": id,
        "author": {"name": format!("{id}-dev"), "emailAddress": format!("{id}@example.com")},
        "authorTimestamp": ts,
        "message": message,
    })
}

fn issue(key: &str, summary: &str) -> Value {
    json!({
        "key": key,
        "fields": {
            "summary": summary,
            "status": {"name": "Done"},
            "issuetype": {"name": "Story"},
            "assignee": {"displayName": "Ann"},
            "fixVersions": [{"name": "1.2"}],
            "updated": "2024-04-21T10:00:00.000+0000"
        }
    })
}

/// Two in-window commits on the first page, an out-of-window one on the second;
/// tickets ABC-1 and ABC-2.
pub fn release_fixture(method: &str, url: &str, _body: &str) -> (u16, String) {
    if method == "GET" && url.starts_with("/rest/api/1.0/projects/MOB/repos/app/commits?") {
        if url.contains("start=0&") {
            let page = json!({
                "values": [
                    commit("c1", APR_20, "feat: ABC-1 login flow"),
                    commit("c2", APR_10, "chore: tidy build"),
                ],
                "isLastPage": false,
                "nextPageStart": 2
            });
            return (200, page.to_string());
        }
        let page = json!({
            "values": [commit("c3", MAR_01, "ABC-2 too old")],
            "isLastPage": true
        });
        return (200, page.to_string());
    }
    if url.starts_with("/rest/api/1.0/projects/MOB/repos?") {
        return (200, json!({"values": []}).to_string());
    }
    if url.starts_with("/rest/api/2/search?") {
        if url.contains("maxResults=0&") {
            return (200, json!({"total": 2, "issues": []}).to_string());
        }
        let page = json!({
            "total": 2,
            "issues": [issue("ABC-1", "Login flow"), issue("ABC-2", "Logout flow")]
        });
        return (200, page.to_string());
    }
    if url.starts_with("/rest/api/2/myself") {
        return (200, json!({"displayName": "Ann"}).to_string());
    }
    if method == "POST" && url == "/v1/chat/completions" {
        let reply = json!({
            "choices": [{"message": {"role": "assistant", "content": "## Release 1.2\n- Login flow (ABC-1)\n"}}],
            "usage": {"prompt_tokens": 700, "completion_tokens": 20}
        });
        return (200, reply.to_string());
    }
    (404, json!({"errors": ["not found"]}).to_string())
}
