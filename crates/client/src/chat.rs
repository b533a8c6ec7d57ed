use rigelnet::rpc::HandlerRegistryBuilder;
use rigelnet::{NodeRef, Rpc, RpcError};

/// Client to server: a chat line from this client.
pub struct Say;

impl Rpc for Say {
    const NAME: &'static str = "demo::say";
    type Args = String;

    fn handle(node: NodeRef<'_>, _text: String) -> Result<(), RpcError> {
        node.require_server()?;
        Ok(())
    }
}

/// Server to clients: a relayed chat line.
pub struct Heard;

impl Rpc for Heard {
    const NAME: &'static str = "demo::heard";
    type Args = (u32, String);

    fn handle(node: NodeRef<'_>, (sender, text): (u32, String)) -> Result<(), RpcError> {
        let client = node.require_client()?;
        if client.client_index() == Some(sender as usize) {
            log::debug!("[chat] echo: {}", text);
        } else {
            log::info!("[chat] client {}: {}", sender, text);
        }
        Ok(())
    }
}

pub fn register_chat_rpcs(builder: HandlerRegistryBuilder) -> Result<HandlerRegistryBuilder, RpcError> {
    builder.register::<Say>()?.register::<Heard>()
}
