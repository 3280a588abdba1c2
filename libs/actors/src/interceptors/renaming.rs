use anyhow::Context as _;
use types::Message;

use crate::interceptor::{Interceptor, Outlet};

/// Moves outgoing payload values from one key path to another.
#[derive(Debug, Clone, Default)]
pub struct RenamingInterceptor {
    renames: Vec<(String, String)>,
}

impl RenamingInterceptor {
    pub fn new<I, A, B>(renames: I) -> Self
    where
        I: IntoIterator<Item = (A, B)>,
        A: Into<String>,
        B: Into<String>,
    {
        Self {
            renames: renames.into_iter().map(|(was, now)| (was.into(), now.into())).collect(),
        }
    }
}

impl Interceptor for RenamingInterceptor {
    fn name(&self) -> &str {
        "renaming"
    }

    fn on_msg_from_worker(&mut self, mut msg: Message, out: &mut Outlet) -> anyhow::Result<()> {
        for (was, now) in &self.renames {
            if let Some(value) = msg.payload_mut().remove(was) {
                msg.payload_mut()
                    .set(now, value)
                    .with_context(|| format!("cannot move {was} to {now}"))?;
            }
        }
        out.push(msg);
        Ok(())
    }
}
