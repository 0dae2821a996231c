use async_trait::async_trait;
use parley_core::{Reply, ReplyKind, ReplySink, Result};

/// Prints replies to stdout
pub struct TerminalSink;

#[async_trait]
impl ReplySink for TerminalSink {
    async fn send(&self, reply: Reply) -> Result<()> {
        match reply.kind {
            ReplyKind::Notice => println!("{}", reply.text),
            ReplyKind::Error => println!("⚠️  {}", reply.text),
            ReplyKind::Answer => println!("\n{}\n", reply.text),
        }
        Ok(())
    }
}
