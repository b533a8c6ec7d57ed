use std::collections::VecDeque;

use rigelnet::rpc::HandlerRegistryBuilder;
use rigelnet::{NodeRef, Receivers, Rpc, RpcError};

const MAX_CHAT_LINES: usize = 64;

/// Recent chat, kept as the server's user data.
#[derive(Debug, Default)]
pub struct ChatLog {
    lines: VecDeque<String>,
}

impl ChatLog {
    pub fn push(&mut self, line: String) {
        if self.lines.len() == MAX_CHAT_LINES {
            self.lines.pop_front();
        }
        self.lines.push_back(line);
    }

    pub fn recent(&self, count: usize) -> impl Iterator<Item = &str> {
        let skip = self.lines.len().saturating_sub(count);
        self.lines.iter().skip(skip).map(String::as_str)
    }
}

/// Client to server: a chat line from the sender.
pub struct Say;

impl Rpc for Say {
    const NAME: &'static str = "demo::say";
    type Args = String;

    fn handle(node: NodeRef<'_>, text: String) -> Result<(), RpcError> {
        let server = node.require_server()?;
        let sender = server
            .sender_index()
            .ok_or_else(|| RpcError::Failed("no sender".to_owned()))?;

        log::info!("[chat] client {}: {}", sender, text);
        if let Some(chat) = server.user_data_mut::<ChatLog>() {
            chat.push(format!("{}: {}", sender, text));
        }
        server.compose::<Heard>(Receivers::All, &(sender as u32, text))
    }
}

/// Server to clients: a relayed chat line.
pub struct Heard;

impl Rpc for Heard {
    const NAME: &'static str = "demo::heard";
    type Args = (u32, String);

    fn handle(node: NodeRef<'_>, _line: (u32, String)) -> Result<(), RpcError> {
        node.require_client()?;
        Ok(())
    }
}

pub fn register_chat_rpcs(builder: HandlerRegistryBuilder) -> Result<HandlerRegistryBuilder, RpcError> {
    builder.register::<Say>()?.register::<Heard>()
}
