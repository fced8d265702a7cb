//! Middleware stacking.
//!
//! A [`Decorator`] turns one app into another. Decorators chain with [`DecoratorExt::and_then`]
//! (apply `self` first) and [`DecoratorExt::compose`] (apply the argument first), so a middleware
//! stack reads the way it is applied:
//!
//! ```
//! use micro_lite::decorator::{Decorator, DecoratorExt, LightenDecorator, LiteDecorator};
//! use micro_lite::{App, Body, Environ, HandlerError, StartResponse, wsgi_fn};
//!
//! async fn legacy(_environ: Environ, start_response: StartResponse) -> Result<Body, HandlerError> {
//!     start_response.call("200 OK", vec![])?;
//!     Ok(Body::from("ok"))
//! }
//!
//! let stack = LightenDecorator::default().and_then(LiteDecorator);
//! let app = stack.decorate(App::legacy(wsgi_fn(legacy)));
//! assert!(app.is_lite());
//! ```

mod adapters;
mod composer;

pub use adapters::{BindDecorator, LightenDecorator, LiteDecorator};
pub use composer::DecoratorComposer;

/// Turns one value into another. Applied to an [`App`](crate::App) it is middleware or an adapter:
/// the returned app wraps the given one, or is the given one when there is nothing to add.
pub trait Decorator<In> {
    type Out;

    fn decorate(&self, raw: In) -> Self::Out;
}

pub trait DecoratorExt<In>: Decorator<In> {
    fn and_then<D>(self, decorator: D) -> DecoratorComposer<Self, D>
    where
        Self: Sized,
    {
        DecoratorComposer::new(self, decorator)
    }

    fn compose<D>(self, decorator: D) -> DecoratorComposer<D, Self>
    where
        Self: Sized,
    {
        DecoratorComposer::new(decorator, self)
    }
}

impl<T: Decorator<In> + ?Sized, In> DecoratorExt<In> for T {}

/// Hands its input back untouched.
#[derive(Default, Clone, Copy, Debug)]
pub struct IdentityDecorator;

impl<In> Decorator<In> for IdentityDecorator {
    type Out = In;

    #[inline]
    fn decorate(&self, raw: In) -> Self::Out {
        raw
    }
}

/// A decorator backed by a plain function, typically an `App -> App` middleware.
#[derive(Copy, Clone, Debug)]
pub struct DecoratorFn<F> {
    f: F,
}

pub fn decorator_fn<In, Out, F>(f: F) -> DecoratorFn<F>
where
    F: Fn(In) -> Out,
{
    DecoratorFn { f }
}

impl<In, Out, F> Decorator<In> for DecoratorFn<F>
where
    F: Fn(In) -> Out,
{
    type Out = Out;

    fn decorate(&self, raw: In) -> Self::Out {
        (self.f)(raw)
    }
}
