//! HTTP transport for the room and estimation services.
//!
//! Unary calls are `POST /<service>/<method>` with a JSON body and the
//! `Connect-Protocol-Version: 1` header. A non-2xx answer carries a
//! `{"code", "message"}` body that becomes [`ServiceError::Rpc`].
//!
//! Server streams use the same request shape; the response body is
//! newline-delimited JSON. Each `{"result": ...}` line is one event, an
//! `{"error": ...}` line ends the stream with that error. Lines that do not
//! parse are skipped.

use std::collections::VecDeque;

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use huddle_core::{EstimationService, EventStream, RoomService, ServiceError};
use huddle_proto::{
    FrameDecoder, Method, RoomEvent, VoteEvent, decode_line,
    rpc::{
        CastVoteRequest, CreateRoomRequest, GetRoomRequest, GetRoomResponse, JoinRoomRequest,
        KickParticipantRequest, ParticipantRequest, RevealVotesResponse, SeatResponse,
        SetTopicRequest, TransferOwnershipRequest, WatchRequest,
    },
};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use tracing::{debug, warn};

const PROTOCOL_HEADER: &str = "Connect-Protocol-Version";

#[derive(Debug, Default, Deserialize)]
struct WireError {
    #[serde(default)]
    code: String,
    #[serde(default)]
    message: String,
}

fn transport(err: &reqwest::Error) -> ServiceError {
    ServiceError::Transport(err.to_string())
}

/// Both services over HTTP.
#[derive(Debug, Clone)]
pub struct HttpService {
    client: reqwest::Client,
    base: String,
}

impl HttpService {
    /// Service rooted at `base_url`, e.g. `http://localhost:8080`.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    /// Service using a preconfigured client.
    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        let mut base = base_url.into();
        while base.ends_with('/') {
            base.pop();
        }
        Self { client, base }
    }

    /// Base URL without a trailing slash.
    pub fn base_url(&self) -> &str {
        &self.base
    }

    fn url(&self, method: Method) -> String {
        format!("{}{}", self.base, method.path())
    }

    async fn post<Req: Serialize + Sync>(
        &self,
        method: Method,
        request: &Req,
        fallback: &str,
    ) -> Result<reqwest::Response, ServiceError> {
        debug!(method = method.name(), "request");
        let response = self
            .client
            .post(self.url(method))
            .header(PROTOCOL_HEADER, "1")
            .json(request)
            .send()
            .await
            .map_err(|err| transport(&err))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let error = response.json::<WireError>().await.unwrap_or_else(|_| WireError {
            code: String::new(),
            message: fallback.to_owned(),
        });
        let message = if error.message.is_empty() { status.to_string() } else { error.message };
        warn!(method = method.name(), %status, %message, "request rejected");
        Err(ServiceError::rpc(error.code, message))
    }

    async fn call<Req, Res>(&self, method: Method, request: &Req) -> Result<Res, ServiceError>
    where
        Req: Serialize + Sync,
        Res: DeserializeOwned,
    {
        let response = self.post(method, request, "Request failed").await?;
        let body = response.bytes().await.map_err(|err| transport(&err))?;
        serde_json::from_slice(&body).map_err(|err| ServiceError::Decode(err.to_string()))
    }

    async fn send<Req: Serialize + Sync>(&self, method: Method, request: &Req) -> Result<(), ServiceError> {
        self.post(method, request, "Request failed").await.map(drop)
    }

    async fn stream<T>(&self, method: Method, request: &WatchRequest) -> Result<EventStream<T>, ServiceError>
    where
        T: DeserializeOwned + Send + 'static,
    {
        let response = self.post(method, request, "Stream failed").await?;
        Ok(decode_stream(response.bytes_stream()))
    }
}

/// Turn a chunked NDJSON body into an event stream.
///
/// The stream ends after the first error: a transport failure, an oversized
/// line, or an end-of-stream frame.
pub fn decode_stream<T, B, C>(body: B) -> EventStream<T>
where
    T: DeserializeOwned + Send + 'static,
    B: Stream<Item = Result<C, reqwest::Error>> + Send + 'static,
    C: AsRef<[u8]> + Send,
{
    let state = (Box::pin(body), FrameDecoder::new(), VecDeque::new(), false);
    futures::stream::unfold(state, |(mut body, mut decoder, mut ready, mut done)| async move {
        loop {
            if let Some(item) = ready.pop_front() {
                return Some((item, (body, decoder, ready, done)));
            }
            if done {
                return None;
            }

            match body.next().await {
                Some(Ok(chunk)) => match decoder.push(chunk.as_ref()) {
                    Ok(lines) => done = queue_lines(&mut ready, &lines),
                    Err(err) => {
                        ready.push_back(Err(ServiceError::from(err)));
                        done = true;
                    },
                },
                Some(Err(err)) => {
                    ready.push_back(Err(transport(&err)));
                    done = true;
                },
                None => {
                    if let Some(rest) = decoder.finish() {
                        queue_lines(&mut ready, &[rest]);
                    }
                    done = true;
                },
            }
        }
    })
    .boxed()
}

/// Queue decoded lines. Returns true once an end frame was queued.
fn queue_lines<T: DeserializeOwned>(
    ready: &mut VecDeque<Result<T, ServiceError>>,
    lines: &[Vec<u8>],
) -> bool {
    for line in lines {
        match decode_line::<T>(line) {
            Ok(Some(envelope)) => {
                let item = envelope.into_result().map_err(ServiceError::from);
                let end = item.is_err();
                ready.push_back(item);
                if end {
                    return true;
                }
            },
            Ok(None) => {},
            Err(err) => warn!(%err, "skipping malformed stream frame"),
        }
    }
    false
}

#[async_trait]
impl RoomService for HttpService {
    async fn create_room(&self, request: CreateRoomRequest) -> Result<SeatResponse, ServiceError> {
        self.call(Method::CreateRoom, &request).await
    }

    async fn join_room(&self, request: JoinRoomRequest) -> Result<SeatResponse, ServiceError> {
        self.call(Method::JoinRoom, &request).await
    }

    async fn leave_room(&self, request: ParticipantRequest) -> Result<(), ServiceError> {
        self.send(Method::LeaveRoom, &request).await
    }

    async fn get_room(&self, request: GetRoomRequest) -> Result<GetRoomResponse, ServiceError> {
        self.call(Method::GetRoom, &request).await
    }

    async fn kick_participant(&self, request: KickParticipantRequest) -> Result<(), ServiceError> {
        self.send(Method::KickParticipant, &request).await
    }

    async fn transfer_ownership(&self, request: TransferOwnershipRequest) -> Result<(), ServiceError> {
        self.send(Method::TransferOwnership, &request).await
    }

    async fn watch_room(&self, request: WatchRequest) -> Result<EventStream<RoomEvent>, ServiceError> {
        self.stream(Method::WatchRoom, &request).await
    }
}

#[async_trait]
impl EstimationService for HttpService {
    async fn start_round(&self, request: ParticipantRequest) -> Result<(), ServiceError> {
        self.send(Method::StartRound, &request).await
    }

    async fn cast_vote(&self, request: CastVoteRequest) -> Result<(), ServiceError> {
        self.send(Method::CastVote, &request).await
    }

    async fn reveal_votes(&self, request: ParticipantRequest) -> Result<RevealVotesResponse, ServiceError> {
        self.call(Method::RevealVotes, &request).await
    }

    async fn reset_round(&self, request: ParticipantRequest) -> Result<(), ServiceError> {
        self.send(Method::ResetRound, &request).await
    }

    async fn set_topic(&self, request: SetTopicRequest) -> Result<(), ServiceError> {
        self.send(Method::SetTopic, &request).await
    }

    async fn watch_votes(&self, request: WatchRequest) -> Result<EventStream<VoteEvent>, ServiceError> {
        self.stream(Method::WatchVotes, &request).await
    }
}

#[cfg(test)]
mod tests {
    use huddle_proto::RoomState;

    use super::*;

    fn body(chunks: &[&str]) -> impl Stream<Item = Result<Vec<u8>, reqwest::Error>> + Send + 'static {
        let chunks: Vec<Result<Vec<u8>, reqwest::Error>> =
            chunks.iter().map(|c| Ok(c.as_bytes().to_vec())).collect();
        futures::stream::iter(chunks)
    }

    #[test]
    fn base_url_loses_trailing_slashes() {
        let service = HttpService::new("http://localhost:8080//");
        assert_eq!(service.base_url(), "http://localhost:8080");
        assert_eq!(
            service.url(Method::JoinRoom),
            "http://localhost:8080/esteemed.v1.RoomService/JoinRoom"
        );
    }

    #[tokio::test]
    async fn events_split_across_chunks() {
        let stream = decode_stream::<RoomEvent, _, _>(body(&[
            r#"{"result":{"stateChanged":{"newState":"ROOM_STATE_VOT"#,
            "ING\"}}}\n\n{\"result\":{\"topicChanged\":{\"topic\":\"login\"}}}",
        ]));
        let events: Vec<_> = stream.collect().await;

        assert_eq!(events, vec![
            Ok(RoomEvent::StateChanged { new_state: RoomState::Voting }),
            Ok(RoomEvent::TopicChanged { topic: "login".into() }),
        ]);
    }

    #[tokio::test]
    async fn malformed_lines_are_skipped() {
        let stream = decode_stream::<VoteEvent, _, _>(body(&["not json\n{\"result\":{\"roundReset\":{}}}\n"]));
        let events: Vec<_> = stream.collect().await;
        assert_eq!(events, vec![Ok(VoteEvent::RoundReset {})]);
    }

    #[tokio::test]
    async fn error_frame_ends_stream() {
        let stream = decode_stream::<VoteEvent, _, _>(body(&[
            "{\"error\":{\"code\":\"not_found\",\"message\":\"room not found\"}}\n",
            "{\"result\":{\"roundReset\":{}}}\n",
        ]));
        let events: Vec<_> = stream.collect().await;
        assert_eq!(events, vec![Err(ServiceError::rpc("not_found", "room not found"))]);
    }
}
