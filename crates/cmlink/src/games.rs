//! Game-session announcement.

use cmlink_protocol::messages::CMsgClientGamesPlayed;
use cmlink_protocol::messages::cmsg_client_games_played::GamePlayed;
use cmlink_protocol::{EMsg, Packet, PacketHeader};

use crate::ClientError;
use crate::client::CmClient;

fn games_played(app_ids: &[u32], client_os_type: u32) -> CMsgClientGamesPlayed {
    CMsgClientGamesPlayed {
        games_played: app_ids
            .iter()
            .map(|&app_id| GamePlayed {
                game_id: Some(u64::from(app_id)),
                ..GamePlayed::default()
            })
            .collect(),
        client_os_type: Some(client_os_type),
    }
}

impl<D> CmClient<D> {
    /// Announces the games we are playing; an empty list means none.
    /// Fire-and-forget.
    pub async fn set_games_played(&self, app_ids: &[u32]) -> Result<(), ClientError> {
        let body = games_played(app_ids, self.session.config.client_os_type);
        let packet = Packet::from_message(EMsg::ClientGamesPlayed, PacketHeader::default(), &body);
        self.session.send("ClientGamesPlayed", packet).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_app_ids_become_game_ids() {
        let body = games_played(&[440, 730], 20);
        let ids: Vec<_> = body.games_played.iter().map(|g| g.game_id).collect();
        assert_eq!(ids, vec![Some(440), Some(730)]);
        assert_eq!(body.client_os_type, Some(20));
    }

    #[test]
    fn test_empty_list_stops_playing() {
        assert!(games_played(&[], 20).games_played.is_empty());
    }
}
