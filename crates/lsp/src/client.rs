use std::collections::HashMap;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;

use crossbeam_channel::{Receiver, Sender};
use lsp_server::{Message, Notification, Request, RequestId, Response};
use parking_lot::Mutex;
use tracing::{info, warn};

/// Cloneable handle for everything the server sends to the client.
#[derive(Clone)]
pub struct Client {
    sender: Sender<Message>,
    outgoing_request_id: Arc<AtomicI32>,
    outgoing_requests: Arc<Mutex<HashMap<RequestId, Sender<Response>>>>,
}

impl Client {
    pub fn new(sender: Sender<Message>) -> Self {
        Self {
            sender,
            outgoing_request_id: Arc::new(AtomicI32::new(1)),
            outgoing_requests: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn send(&self, msg: Message) {
        if self.sender.send(msg).is_err() {
            info!("Connection closed.");
        }
    }

    pub fn respond(&self, response: Response) {
        self.send(Message::Response(response));
    }

    pub fn notify<N>(&self, params: N::Params)
    where
        N: lsp_types::notification::Notification,
    {
        self.send(Message::Notification(Notification::new(
            N::METHOD.to_owned(),
            params,
        )));
    }

    /// Send a server-initiated request. The client's response arrives on
    /// the returned receiver once [`route_response`](Self::route_response)
    /// sees it.
    pub fn request<R>(&self, params: R::Params) -> (RequestId, Receiver<Response>)
    where
        R: lsp_types::request::Request,
    {
        let id = RequestId::from(self.outgoing_request_id.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = crossbeam_channel::bounded(1);
        // Registered before sending so a fast reply cannot be missed.
        self.outgoing_requests.lock().insert(id.clone(), tx);
        self.send(Message::Request(Request::new(
            id.clone(),
            R::METHOD.to_owned(),
            params,
        )));
        (id, rx)
    }

    /// Stop waiting for the response to `id`.
    pub fn forget(&self, id: &RequestId) {
        self.outgoing_requests.lock().remove(id);
    }

    /// Hand a client response to the request waiting for it. Returns
    /// whether anyone was waiting.
    pub fn route_response(&self, response: Response) -> bool {
        let waiting = self.outgoing_requests.lock().remove(&response.id);
        match waiting {
            Some(tx) => {
                if let Some(error) = &response.error {
                    warn!(
                        "client rejected request {}: {} ({})",
                        response.id, error.message, error.code
                    );
                }
                // The requester may have timed out already.
                let _ = tx.send(response);
                true
            }
            None => {
                info!("Response with unknown ID: {}", response.id);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lsp_types::request::WorkDoneProgressCreate;
    use lsp_types::{NumberOrString, WorkDoneProgressCreateParams};

    #[test]
    fn responses_reach_their_request() {
        let (tx, rx) = crossbeam_channel::unbounded();
        let client = Client::new(tx);
        let (id, pending) = client.request::<WorkDoneProgressCreate>(WorkDoneProgressCreateParams {
            token: NumberOrString::String("t".into()),
        });
        let Message::Request(sent) = rx.recv().unwrap() else {
            panic!("expected a request");
        };
        assert_eq!(sent.id, id);
        assert_eq!(sent.method, "window/workDoneProgress/create");

        assert!(client.route_response(Response::new_ok(id.clone(), ())));
        assert_eq!(pending.recv().unwrap().id, id);
        // Already answered.
        assert!(!client.route_response(Response::new_ok(id, ())));
    }

    #[test]
    fn unknown_and_forgotten_ids_are_dropped() {
        let (tx, _rx) = crossbeam_channel::unbounded();
        let client = Client::new(tx);
        assert!(!client.route_response(Response::new_ok(RequestId::from(99), ())));

        let (id, _pending) =
            client.request::<WorkDoneProgressCreate>(WorkDoneProgressCreateParams {
                token: NumberOrString::Number(1),
            });
        client.forget(&id);
        assert!(!client.route_response(Response::new_ok(id, ())));
    }

    #[test]
    fn sending_after_disconnect_does_not_panic() {
        let (tx, rx) = crossbeam_channel::unbounded();
        drop(rx);
        let client = Client::new(tx);
        client.notify::<lsp_types::notification::Exit>(());
    }
}
