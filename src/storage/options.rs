/// Configuration options supplied when creating a [`super::VersionedGraph`].
#[derive(Clone, Debug, Default)]
pub struct GraphOptions {
    /// Expected number of vertices, used to pre-size internal maps.
    pub vertex_capacity: usize,
}

impl GraphOptions {
    /// Creates options with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the expected vertex count.
    pub fn vertex_capacity(mut self, vertices: usize) -> Self {
        self.vertex_capacity = vertices;
        self
    }
}
