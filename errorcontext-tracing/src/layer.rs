use std::fmt;

use tracing::{
    Span,
    field::{Field, Visit},
};
use tracing_subscriber::{Registry, registry::LookupSpan};

use crate::{FieldValue, Fields};

/// A tracing layer that records span field values so they can be attached to
/// errors.
///
/// Add this to your subscriber alongside your other layers. Without it,
/// [`current_span_fields`] always returns an empty dictionary.
///
/// # Examples
///
/// ```
/// use errorcontext_tracing::{ErrorContextLayer, current_span_fields};
/// use tracing_subscriber::{Registry, layer::SubscriberExt};
///
/// let subscriber = Registry::default().with(ErrorContextLayer);
///
/// tracing::subscriber::with_default(subscriber, || {
///     let span = tracing::info_span!("request", user_id = 42u64);
///     let _guard = span.enter();
///     assert_eq!(current_span_fields().to_string(), "user_id=42");
/// });
/// ```
#[derive(Copy, Clone, Debug, Default)]
pub struct ErrorContextLayer;

/// Field values recorded for a single span.
#[derive(Clone, Debug, Default)]
struct SpanFields(Fields);

struct FieldsVisitor<'a>(&'a mut Fields);

impl Visit for FieldsVisitor<'_> {
    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.0.insert(field.name(), format!("{value:?}"));
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        self.0.insert(field.name(), value);
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.0.insert(field.name(), value);
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.0.insert(field.name(), value);
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        self.0.insert(field.name(), value);
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.0.insert(field.name(), FieldValue::Bool(value));
    }
}

impl<S> tracing_subscriber::Layer<S> for ErrorContextLayer
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_new_span(
        &self,
        attrs: &tracing::span::Attributes<'_>,
        id: &tracing::span::Id,
        ctx: tracing_subscriber::layer::Context<'_, S>,
    ) {
        let Some(span) = ctx.span(id) else {
            return;
        };

        let mut fields = Fields::new();
        attrs.record(&mut FieldsVisitor(&mut fields));
        span.extensions_mut().insert(SpanFields(fields));
    }

    fn on_record(
        &self,
        id: &tracing::span::Id,
        values: &tracing::span::Record<'_>,
        ctx: tracing_subscriber::layer::Context<'_, S>,
    ) {
        let Some(span) = ctx.span(id) else {
            return;
        };

        let mut extensions = span.extensions_mut();
        if let Some(captured) = extensions.get_mut::<SpanFields>() {
            values.record(&mut FieldsVisitor(&mut captured.0));
        } else {
            let mut fields = Fields::new();
            values.record(&mut FieldsVisitor(&mut fields));
            extensions.insert(SpanFields(fields));
        }
    }
}

/// Returns the fields recorded by [`ErrorContextLayer`] for the current span
/// and all of its parents.
///
/// Fields are merged root span first, so a child span's value wins when two
/// spans record the same key. Returns an empty dictionary when there is no
/// current span or the subscriber is not built on a
/// [`tracing_subscriber::Registry`].
pub fn current_span_fields() -> Fields {
    Span::current()
        .with_subscriber(|(id, dispatch)| {
            let Some(registry) = dispatch.downcast_ref::<Registry>() else {
                return Fields::new();
            };
            let Some(span) = registry.span(id) else {
                return Fields::new();
            };

            let mut fields = Fields::new();
            for ancestor in span.scope().from_root() {
                let extensions = ancestor.extensions();
                if let Some(captured) = extensions.get::<SpanFields>() {
                    fields.extend(captured.0.clone());
                }
            }
            fields
        })
        .unwrap_or_default()
}
