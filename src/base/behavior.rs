use std::sync::Arc;

/// Behaviors common to every clocked component in the fabric.  `tick_one`
/// advances the component by exactly one cycle; all registered state must be
/// read before any of it is written so that the whole model commits atomically
/// per cycle.
pub trait ModuleBehaviors {
    fn tick_one(&mut self);
    fn reset(&mut self);
}

/// Components that take an immutable, shared configuration at construction.
pub trait Parameterizable {
    type ConfigType;

    fn conf(&self) -> &Self::ConfigType;
    fn init_conf(&mut self, conf: Arc<Self::ConfigType>);
}
