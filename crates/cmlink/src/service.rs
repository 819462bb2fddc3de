//! Typed service-method calls.
//!
//! A service method is named `Interface.Method#Version` and carried by a
//! `ServiceMethodCallFromClient` packet whose header names the method and
//! a fresh source job id. The server answers with a packet whose target
//! job id is that id; its header result says whether the call succeeded.

use cmlink_protocol::messages::{
    CAuthenticationAccessTokenGenerateForAppRequest,
    CAuthenticationAccessTokenGenerateForAppResponse,
};
use cmlink_protocol::{EMsg, Packet, PacketHeader};
use prost::Message;
use tracing::debug;

use crate::client::CmClient;
use crate::{ClientError, RequestError};

const GENERATE_ACCESS_TOKEN: &str = "Authentication.GenerateAccessTokenForApp#1";

/// Tokens issued by [`CmClient::generate_access_token_for_app`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessTokens {
    pub access_token: String,
    /// Set only when the server rotated the refresh token.
    pub refresh_token: Option<String>,
}

fn call_packet(method: &str, job_id: u64, body: &impl Message) -> Packet {
    let header = PacketHeader {
        jobid_source: Some(job_id),
        target_job_name: Some(method.to_string()),
        ..PacketHeader::default()
    };
    Packet::from_message(EMsg::ServiceMethodCallFromClient, header, body)
}

impl<D> CmClient<D> {
    /// Calls service method `method` and decodes its response.
    ///
    /// # Errors
    /// A [`RequestError`] naming the phase that failed: send, await
    /// (timeout or disconnect), server rejection, or decode.
    pub async fn call_service_method<Req, Resp>(
        &self,
        method: &str,
        request: &Req,
    ) -> Result<Resp, ClientError>
    where
        Req: Message,
        Resp: Message + Default,
    {
        let job_id = self.session.next_job_id();
        debug!(method, job_id, "calling service method");

        let slot = self.session.register_job(job_id);
        let reply = self
            .session
            .request(method, call_packet(method, job_id, request), slot)
            .await?;

        let result = reply.header.result();
        if !result.is_ok() {
            return Err(RequestError::Rejected {
                what: method.to_string(),
                result,
            }
            .into());
        }

        reply
            .decode_body::<Resp>("service method response")
            .map_err(|source| {
                RequestError::Decode {
                    what: method.to_string(),
                    source,
                }
                .into()
            })
    }

    /// Exchanges a refresh token for a fresh access token.
    pub async fn generate_access_token_for_app(
        &self,
        refresh_token: &str,
    ) -> Result<AccessTokens, ClientError> {
        let request = CAuthenticationAccessTokenGenerateForAppRequest {
            refresh_token: Some(refresh_token.to_string()),
            steamid: Some(self.session.state().steam_id.to_u64()),
            ..CAuthenticationAccessTokenGenerateForAppRequest::default()
        };
        let response: CAuthenticationAccessTokenGenerateForAppResponse =
            self.call_service_method(GENERATE_ACCESS_TOKEN, &request).await?;

        Ok(AccessTokens {
            access_token: response.access_token.unwrap_or_default(),
            refresh_token: response.refresh_token.filter(|t| !t.is_empty()),
        })
    }
}
