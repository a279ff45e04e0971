/// Pre-defined color blending modes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum BlendMode {
    #[default]
    Alpha = 0,
    Additive,
    Multiplied,
}
