/// How a lightened legacy application's `write()` calls are served.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WriteSupport {
    /// Run the application as a suspendable producer and interleave its writes with its body.
    #[default]
    Cooperative,
    /// `write()` fails with [`LiteError::WriteUnsupported`](crate::LiteError::WriteUnsupported).
    Disabled,
}

/// Settings of the legacy to simplified adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdapterConfig {
    write_support: WriteSupport,
    write_buffer: usize,
}

impl AdapterConfig {
    pub const DEFAULT_WRITE_BUFFER: usize = 1;

    pub fn new() -> Self {
        Self { write_support: WriteSupport::default(), write_buffer: Self::DEFAULT_WRITE_BUFFER }
    }

    #[must_use]
    pub fn with_write_support(mut self, write_support: WriteSupport) -> Self {
        self.write_support = write_support;
        self
    }

    /// Number of written chunks the producer may run ahead of the consumer.
    #[must_use]
    pub fn with_write_buffer(mut self, write_buffer: usize) -> Self {
        self.write_buffer = write_buffer;
        self
    }

    pub fn write_support(&self) -> WriteSupport {
        self.write_support
    }

    pub fn write_buffer(&self) -> usize {
        self.write_buffer
    }
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self::new()
    }
}
