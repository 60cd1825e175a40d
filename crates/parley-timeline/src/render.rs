use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};

use tracing::warn;

use parley_types::{Message, MessageId, MessageKind};

use crate::content::{ContentTransform, display_body};
use crate::error::RenderError;

/// Produces a renderable unit for one message kind.
pub trait MessageRenderer<R> {
    fn render(&self, message: &Message, body: &str) -> Result<R, RenderError>;
}

impl<R, F> MessageRenderer<R> for F
where
    F: Fn(&Message, &str) -> Result<R, RenderError>,
{
    fn render(&self, message: &Message, body: &str) -> Result<R, RenderError> {
        self(message, body)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Rendered<R> {
    Ready(R),
    /// No renderer for this kind
    Unsupported { id: MessageId, kind: MessageKind },
    /// The renderer failed; shown as an inline error placeholder
    Failed { id: MessageId, reason: String },
}

/// One renderer per message kind. Failures stay local to the message.
pub struct RenderRegistry<R> {
    renderers: HashMap<MessageKind, Box<dyn MessageRenderer<R>>>,
}

impl<R> Default for RenderRegistry<R> {
    fn default() -> Self {
        Self {
            renderers: HashMap::new(),
        }
    }
}

impl<R> RenderRegistry<R> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install the renderer for `kind`, replacing any previous one.
    pub fn register<T>(&mut self, kind: MessageKind, renderer: T)
    where
        T: MessageRenderer<R> + 'static,
    {
        self.renderers.insert(kind, Box::new(renderer));
    }

    pub fn render(&self, message: &Message, body: &str) -> Rendered<R> {
        let Some(renderer) = self.renderers.get(&message.kind) else {
            return Rendered::Unsupported {
                id: message.id,
                kind: message.kind,
            };
        };

        match catch_unwind(AssertUnwindSafe(|| renderer.render(message, body))) {
            Ok(Ok(unit)) => Rendered::Ready(unit),
            Ok(Err(e)) => {
                warn!(id = %message.id, kind = ?message.kind, "{}", e);
                Rendered::Failed {
                    id: message.id,
                    reason: e.to_string(),
                }
            }
            Err(_) => {
                warn!(id = %message.id, kind = ?message.kind, "Renderer panicked");
                Rendered::Failed {
                    id: message.id,
                    reason: "renderer panicked".to_string(),
                }
            }
        }
    }

    /// Decrypt then render every message.
    pub fn render_all<'a, I, T>(&self, messages: I, transform: &T) -> Vec<Rendered<R>>
    where
        I: IntoIterator<Item = &'a Message>,
        T: ContentTransform + ?Sized,
    {
        messages
            .into_iter()
            .map(|m| self.render(m, &display_body(transform, m)))
            .collect()
    }
}
