//! Output buffers with placeholders for deferred child components

/// Index of a job in the render run's arena
pub type JobId = usize;

/// A piece of a job's output
#[derive(Debug, Clone, PartialEq)]
pub enum Part {
    Text(String),
    /// Final output of a child job, spliced in when the child completes
    Child(JobId),
}

/// Output of one job, built while its template executes
#[derive(Debug, Default)]
pub struct Output {
    parts: Vec<Part>,
}

impl Output {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append text, merging into the previous text part
    pub fn push_str(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        match self.parts.last_mut() {
            Some(Part::Text(last)) => last.push_str(text),
            _ => self.parts.push(Part::Text(text.to_string())),
        }
    }

    pub fn push_child(&mut self, job: JobId) {
        self.parts.push(Part::Child(job));
    }

    /// Ids of the children referenced by this buffer, in output order
    pub fn children(&self) -> impl Iterator<Item = JobId> + '_ {
        self.parts.iter().filter_map(|part| match part {
            Part::Child(id) => Some(*id),
            Part::Text(_) => None,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    /// Join the parts, taking each child's finished output from `finished`
    pub fn assemble(self, mut finished: impl FnMut(JobId) -> String) -> String {
        let mut out = String::new();
        for part in self.parts {
            match part {
                Part::Text(text) => out.push_str(&text),
                Part::Child(id) => out.push_str(&finished(id)),
            }
        }
        out
    }
}
