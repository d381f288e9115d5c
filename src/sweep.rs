/// Como identifier/sequence variam entre iterações do cliente.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SweepMode {
    /// Identifier e sequence fixos.
    #[default]
    None,
    /// Identifier +1 por iteração (novas sessões no NAT).
    Identifier,
    /// Sequence +1 por iteração (comportamento típico do ping).
    Sequence,
}

/// Par identifier/sequence de uma iteração.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EchoIds {
    pub identifier: u16,
    pub sequence: u16,
}

impl EchoIds {
    pub fn new(identifier: u16, sequence: u16) -> Self {
        Self {
            identifier,
            sequence,
        }
    }

    /// Próximo par conforme o modo. Os dois campos dão a volta em 65536
    /// de forma independente.
    pub fn advance(self, mode: SweepMode) -> Self {
        match mode {
            SweepMode::None => self,
            SweepMode::Identifier => Self {
                identifier: self.identifier.wrapping_add(1),
                ..self
            },
            SweepMode::Sequence => Self {
                sequence: self.sequence.wrapping_add(1),
                ..self
            },
        }
    }
}

/// Iterador sobre os pares usados em cada iteração a partir de `base`.
pub fn progression(base: EchoIds, mode: SweepMode) -> impl Iterator<Item = EchoIds> {
    std::iter::successors(Some(base), move |ids| Some(ids.advance(mode)))
}
