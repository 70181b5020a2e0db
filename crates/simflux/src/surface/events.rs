//! Event types and sinks for observing surface extraction.
//!
//! [`SurfaceExtractor::extract_with_events`](crate::surface::SurfaceExtractor::extract_with_events)
//! reports progress as [`SurfaceEvent`]s to any [`EventSink`].
use crate::data::PatchId;
use crate::fields::FieldKey;
use crate::surface::SurfaceConfig;

/// Describes events emitted while extracting a surface.
#[non_exhaustive]
#[derive(Debug, Clone)]
pub enum SurfaceEvent {
    /// Emitted before any patch is processed.
    ExtractionStarted {
        field: FieldKey,
        isovalue: f64,
        config: SurfaceConfig,
        /// Patches intersecting the container's selection.
        patch_count: usize,
    },

    /// Emitted after marching one patch.
    PatchExtracted {
        patch: PatchId,
        /// Vertices produced before merging.
        vertices: usize,
        triangles: usize,
    },

    /// Emitted after seam vertices were merged.
    VerticesMerged {
        before: usize,
        after: usize,
        /// Triangles dropped because merging collapsed them.
        dropped_triangles: usize,
    },

    /// Emitted when the surface is complete.
    ExtractionFinished { vertices: usize, triangles: usize },

    /// Non-fatal condition, such as an isovalue outside the data range.
    Warning { context: String, message: String },
}

/// Discriminant of a [`SurfaceEvent`], used for filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SurfaceEventKind {
    ExtractionStarted,
    PatchExtracted,
    VerticesMerged,
    ExtractionFinished,
    Warning,
}

impl SurfaceEvent {
    pub fn kind(&self) -> SurfaceEventKind {
        match self {
            SurfaceEvent::ExtractionStarted { .. } => SurfaceEventKind::ExtractionStarted,
            SurfaceEvent::PatchExtracted { .. } => SurfaceEventKind::PatchExtracted,
            SurfaceEvent::VerticesMerged { .. } => SurfaceEventKind::VerticesMerged,
            SurfaceEvent::ExtractionFinished { .. } => SurfaceEventKind::ExtractionFinished,
            SurfaceEvent::Warning { .. } => SurfaceEventKind::Warning,
        }
    }
}

/// A generic event sink that accepts [`SurfaceEvent`]s.
pub trait EventSink {
    fn send(&mut self, event: SurfaceEvent);

    /// Whether events of `kind` should be built and sent at all.
    fn wants(&self, _kind: SurfaceEventKind) -> bool {
        true
    }
}

/// A no-op event sink.
impl EventSink for () {
    #[inline]
    fn send(&mut self, _event: SurfaceEvent) {}

    #[inline]
    fn wants(&self, _kind: SurfaceEventKind) -> bool {
        false
    }
}

/// An event sink that forwards to a user-provided closure.
pub struct FnSink<F>
where
    F: FnMut(SurfaceEvent),
{
    f: F,
}

impl<F> FnSink<F>
where
    F: FnMut(SurfaceEvent),
{
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

impl<F> EventSink for FnSink<F>
where
    F: FnMut(SurfaceEvent),
{
    #[inline]
    fn send(&mut self, event: SurfaceEvent) {
        (self.f)(event);
    }
}

/// An event sink that collects events in a `Vec`, optionally filtered by kind.
#[derive(Default)]
pub struct VecSink {
    events: Vec<SurfaceEvent>,
    only: Option<Vec<SurfaceEventKind>>,
}

impl VecSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Collects only events of the given kinds.
    pub fn only(kinds: &[SurfaceEventKind]) -> Self {
        Self {
            events: Vec::new(),
            only: Some(kinds.to_vec()),
        }
    }

    pub fn into_inner(self) -> Vec<SurfaceEvent> {
        self.events
    }

    pub fn as_slice(&self) -> &[SurfaceEvent] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

impl EventSink for VecSink {
    #[inline]
    fn send(&mut self, event: SurfaceEvent) {
        if self.wants(event.kind()) {
            self.events.push(event);
        }
    }

    fn wants(&self, kind: SurfaceEventKind) -> bool {
        self.only.as_ref().is_none_or(|kinds| kinds.contains(&kind))
    }
}

/// Fan-out sink that forwards each event to all contained sinks.
pub struct MultiSink<S: EventSink> {
    pub(crate) sinks: Vec<S>,
}

impl<S: EventSink> MultiSink<S> {
    pub fn new() -> Self {
        Self { sinks: Vec::new() }
    }

    pub fn with_sinks(sinks: Vec<S>) -> Self {
        Self { sinks }
    }

    pub fn push(&mut self, sink: S) {
        self.sinks.push(sink);
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl<S: EventSink> Default for MultiSink<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: EventSink> EventSink for MultiSink<S> {
    fn send(&mut self, event: SurfaceEvent) {
        let Some((last, rest)) = self.sinks.split_last_mut() else {
            return;
        };
        for sink in rest {
            sink.send(event.clone());
        }
        last.send(event);
    }

    fn wants(&self, kind: SurfaceEventKind) -> bool {
        self.sinks.iter().any(|s| s.wants(kind))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn warning() -> SurfaceEvent {
        SurfaceEvent::Warning {
            context: "density".into(),
            message: "isovalue out of range".into(),
        }
    }

    #[test]
    fn vec_sink_filters_by_kind() {
        let mut sink = VecSink::only(&[SurfaceEventKind::Warning]);
        sink.send(SurfaceEvent::ExtractionFinished {
            vertices: 0,
            triangles: 0,
        });
        sink.send(warning());
        assert_eq!(sink.len(), 1);
        assert!(!sink.wants(SurfaceEventKind::PatchExtracted));
    }

    #[test]
    fn multi_sink_fans_out_events() {
        let mut multi = MultiSink::with_sinks(vec![VecSink::new(), VecSink::new()]);
        multi.send(warning());
        assert_eq!(multi.len(), 2);
        assert_eq!(multi.sinks[0].len(), 1);
        matches!(multi.sinks[1].as_slice()[0], SurfaceEvent::Warning { .. })
            .then_some(())
            .expect("event captured");
    }

    #[test]
    fn unit_sink_wants_nothing() {
        let sink = ();
        assert!(!sink.wants(SurfaceEventKind::Warning));
    }

    #[test]
    fn fn_sink_invokes_callback() {
        let mut count = 0;
        let mut sink = FnSink::new(|_event| count += 1);
        sink.send(warning());
        sink.send(warning());
        drop(sink);
        assert_eq!(count, 2);
    }
}
