use crate::dsl::{Flow, Step};

pub struct FlowBuilder {
    steps: Vec<Step>,
}

impl FlowBuilder {
    pub fn new() -> Self {
        Self { steps: Vec::new() }
    }

    /// Sequential step.
    pub fn task(mut self, id: &str) -> Self {
        self.steps.push(Step::task(id));
        self
    }

    /// Parallel group; members run concurrently and merge together.
    pub fn group<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.steps.push(Step::group(ids));
        self
    }

    pub fn build(self) -> Flow {
        Flow::new(self.steps)
    }
}

impl Default for FlowBuilder {
    fn default() -> Self {
        Self::new()
    }
}
