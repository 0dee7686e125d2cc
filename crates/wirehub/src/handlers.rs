//! Built-in message handlers.

use wirehub_server::{DispatchTable, HandlerError, RequestContext};

/// Echo the payload back.
pub const ECHO: u32 = 1;

/// Echo request and reply.
#[derive(bincode::Encode, bincode::Decode, Debug, Clone, PartialEq, Eq)]
pub struct Echo(pub String);

/// Dispatch table with every built-in handler.
pub fn dispatch_table() -> DispatchTable {
    let mut table = DispatchTable::new();
    table.register_fn(ECHO, |_ctx: RequestContext, echo: Echo| async move {
        Ok::<_, HandlerError>(echo)
    });
    table
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use futures::{SinkExt, StreamExt};
    use tokio_tungstenite::connect_async;
    use tokio_tungstenite::tungstenite::Message as WsMessage;
    use wirehub_protocol::{decode, encode, Message, PrototypeMap};
    use wirehub_server::{ServerConfig, WireHubServer};

    #[test]
    fn table_registers_echo() {
        assert_eq!(dispatch_table().msg_types(), vec![ECHO]);
    }

    #[tokio::test]
    async fn echo_over_socket() {
        let server = WireHubServer::new(ServerConfig::default(), dispatch_table());
        let (addr, _serve) = server.listen().await.unwrap();
        let (mut client, _) = connect_async(format!("ws://{addr}/ws")).await.unwrap();

        let request = Message::request(ECHO, Echo("hi".into()));
        client
            .send(WsMessage::Binary(encode(&request).unwrap()))
            .await
            .unwrap();

        let reply = loop {
            let frame = tokio::time::timeout(Duration::from_secs(5), client.next())
                .await
                .unwrap()
                .unwrap()
                .unwrap();
            if let WsMessage::Binary(bytes) = frame {
                break decode(&bytes, &PrototypeMap::new().with::<Echo>(ECHO)).unwrap();
            }
        };
        assert_eq!(reply.request_id, request.request_id);
        assert_eq!(reply.payload_as::<Echo>(), Some(&Echo("hi".into())));

        assert!(server.shutdown().await);
    }
}
