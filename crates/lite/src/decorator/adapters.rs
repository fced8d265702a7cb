use crate::app::App;
use crate::bind::Bindings;
use crate::config::AdapterConfig;
use crate::decorator::Decorator;
use crate::error::BindError;
use crate::lighten::lighten_with;
use crate::lite::{lite, lite_with};

/// Applies [`lite`].
#[derive(Default, Clone, Copy, Debug)]
pub struct LiteDecorator;

impl Decorator<App> for LiteDecorator {
    type Out = App;

    fn decorate(&self, raw: App) -> Self::Out {
        lite(raw)
    }
}

/// Applies [`lite_with`] with a fixed binding set.
///
/// Stacking several of these onto the same handler merges the sets into one wrapper.
#[derive(Default, Clone, Debug)]
pub struct BindDecorator {
    bindings: Bindings,
}

impl BindDecorator {
    pub fn new(bindings: Bindings) -> Self {
        Self { bindings }
    }
}

impl Decorator<App> for BindDecorator {
    type Out = Result<App, BindError>;

    fn decorate(&self, raw: App) -> Self::Out {
        lite_with(raw, &self.bindings)
    }
}

/// Applies [`lighten_with`] with its adapter settings.
#[derive(Default, Clone, Copy, Debug)]
pub struct LightenDecorator {
    config: AdapterConfig,
}

impl LightenDecorator {
    pub fn new(config: AdapterConfig) -> Self {
        Self { config }
    }
}

impl Decorator<App> for LightenDecorator {
    type Out = App;

    fn decorate(&self, raw: App) -> Self::Out {
        lighten_with(raw, self.config)
    }
}
