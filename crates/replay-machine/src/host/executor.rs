use super::{ActionSink, ReplayEffect, ReplayState, TimeMs};

/// Interprets renderer effects on behalf of the engine.
///
/// Calls happen on the engine task and must not block. Anything that takes
/// time (building a renderer, waiting for it to finish) should be spawned
/// and reported back through the [`ActionSink`], tagged with the generation
/// the effect carried.
pub trait EffectExecutor: Send + 'static {
	fn execute(&mut self, effect: &ReplayEffect, state: &ReplayState, sink: &ActionSink);

	/// Local time of the active renderer, sampled on every tick
	fn sample_local_time_ms(&mut self, state: &ReplayState, now_ms: TimeMs) -> Option<TimeMs> {
		let _ = (state, now_ms);
		None
	}
}
