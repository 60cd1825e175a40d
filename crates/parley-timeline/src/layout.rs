use std::collections::HashMap;

use parley_types::MessageId;

/// Geometry of one rendered message node, relative to the scroll container's
/// top edge (negative when scrolled above it).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NodeRect {
    pub id: MessageId,
    pub top: f64,
    pub bottom: f64,
}

impl NodeRect {
    pub fn height(&self) -> f64 {
        self.bottom - self.top
    }
}

/// What the scroll controller needs from the rendered message list.
pub trait Viewport {
    fn scroll_top(&self) -> f64;
    fn set_scroll_top(&mut self, value: f64);
    fn scroll_height(&self) -> f64;
    fn client_height(&self) -> f64;

    /// Rendered nodes in top-down order.
    fn rendered_nodes(&self) -> Vec<NodeRect>;

    fn node_rect(&self, id: MessageId) -> Option<NodeRect> {
        self.rendered_nodes().into_iter().find(|n| n.id == id)
    }
}

/// How much of one node is inside the container.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Intersection {
    pub id: MessageId,
    pub ratio: f64,
}

/// Intersection ratio of every rendered node with the container.
pub fn intersections<V: Viewport + ?Sized>(viewport: &V) -> Vec<Intersection> {
    let client_height = viewport.client_height();
    viewport
        .rendered_nodes()
        .into_iter()
        .map(|node| {
            let height = node.height();
            let visible = (node.bottom.min(client_height) - node.top.max(0.0)).max(0.0);
            let ratio = if height > 0.0 { visible / height } else { 0.0 };
            Intersection { id: node.id, ratio }
        })
        .collect()
}

/// Simulated layout: messages stacked top to bottom with known heights.
///
/// Stands in for a real renderer when replaying transcripts and in tests.
/// `render` plays the part of a DOM commit: it replaces the node list but
/// leaves `scroll_top` alone, exactly as a browser does when content is
/// prepended.
#[derive(Debug, Clone)]
pub struct StackedViewport {
    client_height: f64,
    row_height: f64,
    heights: HashMap<MessageId, f64>,
    rows: Vec<MessageId>,
    scroll_top: f64,
}

impl StackedViewport {
    pub fn new(client_height: f64, row_height: f64) -> Self {
        Self {
            client_height,
            row_height,
            heights: HashMap::new(),
            rows: Vec::new(),
            scroll_top: 0.0,
        }
    }

    /// Override the height of one row (e.g. an image card).
    pub fn set_row_height(&mut self, id: MessageId, height: f64) {
        self.heights.insert(id, height);
    }

    pub fn render<I>(&mut self, ids: I)
    where
        I: IntoIterator<Item = MessageId>,
    {
        self.rows = ids.into_iter().collect();
        self.scroll_top = self.clamp(self.scroll_top);
    }

    pub fn scroll_by(&mut self, delta: f64) {
        self.set_scroll_top(self.scroll_top + delta);
    }

    pub fn scroll_to_end(&mut self) {
        self.set_scroll_top(f64::MAX);
    }

    fn height_of(&self, id: MessageId) -> f64 {
        self.heights.get(&id).copied().unwrap_or(self.row_height)
    }

    fn clamp(&self, value: f64) -> f64 {
        let max = (self.scroll_height() - self.client_height).max(0.0);
        value.clamp(0.0, max)
    }
}

impl Viewport for StackedViewport {
    fn scroll_top(&self) -> f64 {
        self.scroll_top
    }

    fn set_scroll_top(&mut self, value: f64) {
        self.scroll_top = self.clamp(value);
    }

    fn scroll_height(&self) -> f64 {
        self.rows.iter().map(|id| self.height_of(*id)).sum()
    }

    fn client_height(&self) -> f64 {
        self.client_height
    }

    fn rendered_nodes(&self) -> Vec<NodeRect> {
        let mut y = -self.scroll_top;
        self.rows
            .iter()
            .map(|id| {
                let height = self.height_of(*id);
                let rect = NodeRect {
                    id: *id,
                    top: y,
                    bottom: y + height,
                };
                y += height;
                rect
            })
            .collect()
    }
}
