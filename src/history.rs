use crate::Real;
use na::DVector;
use std::ops::Index;

/// A sequence of values indexed by iteration number.
///
/// A track may forget its oldest entries (see [`Track::retain_last`]). It still remembers how
/// many values were ever pushed, and it keeps answering to the original iteration numbers.
#[derive(Clone, PartialEq, Debug)]
#[cfg_attr(
    feature = "serde-serialize",
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct Track<T> {
    /// Iteration number of the first value ever pushed.
    origin: usize,
    /// Number of values forgotten so far.
    evicted: usize,
    items: Vec<T>,
}

impl<T> Track<T> {
    /// An empty track whose first value will belong to iteration `origin`.
    pub fn new(origin: usize) -> Self {
        Self {
            origin,
            evicted: 0,
            items: vec![],
        }
    }

    /// Total number of values ever pushed, including the forgotten ones.
    pub fn len(&self) -> usize {
        self.evicted + self.items.len()
    }

    /// Whether nothing was ever pushed.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Iteration number of the oldest retained value.
    pub fn first_retained(&self) -> usize {
        self.origin + self.evicted
    }

    /// The value of iteration `epoch`, if it exists and was not forgotten.
    pub fn get(&self, epoch: usize) -> Option<&T> {
        epoch
            .checked_sub(self.first_retained())
            .and_then(|i| self.items.get(i))
    }

    /// The most recent value.
    pub fn last(&self) -> Option<&T> {
        self.items.last()
    }

    /// The retained values, oldest first.
    pub fn retained(&self) -> &[T] {
        &self.items
    }

    /// Iterates through the retained values together with their iteration number.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &T)> + '_ {
        let first = self.first_retained();
        self.items.iter().enumerate().map(move |(i, e)| (first + i, e))
    }

    pub(crate) fn push(&mut self, value: T) {
        self.items.push(value);
    }

    /// Drops the values of iteration `epoch` and later. Forgotten values stay forgotten.
    pub(crate) fn truncate(&mut self, epoch: usize) {
        let keep = epoch.saturating_sub(self.origin).saturating_sub(self.evicted);
        self.items.truncate(keep);
    }

    /// Forgets everything but the `n` most recent values.
    pub(crate) fn retain_last(&mut self, n: usize) {
        if self.items.len() > n {
            let excess = self.items.len() - n;
            let _ = self.items.drain(..excess);
            self.evicted += excess;
        }
    }
}

impl<T> Index<usize> for Track<T> {
    type Output = T;

    /// # Panics
    /// If `epoch` was never reached or was already forgotten.
    fn index(&self, epoch: usize) -> &T {
        match self.get(epoch) {
            Some(value) => value,
            None => panic!(
                "iteration {} is not stored (retained: {}..{})",
                epoch,
                self.first_retained(),
                self.origin + self.len()
            ),
        }
    }
}

/// Everything computed by the conjugate gradient iterations.
///
/// After `k` completed iterations, `x().len() == k + 1`, `r()`, `p()` and `a()` have length `k`,
/// and `beta().len() == k.saturating_sub(1)`. The Fletcher–Reeves coefficients start at
/// iteration `1`.
#[derive(Clone, PartialEq, Debug)]
#[cfg_attr(
    feature = "serde-serialize",
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct History {
    pub(crate) x: Track<DVector<Real>>,
    pub(crate) r: Track<DVector<Real>>,
    pub(crate) p: Track<DVector<Real>>,
    pub(crate) a: Track<Real>,
    pub(crate) beta: Track<Real>,
}

impl History {
    pub(crate) fn new(x0: DVector<Real>) -> Self {
        let mut x = Track::new(0);
        x.push(x0);

        Self {
            x,
            r: Track::new(0),
            p: Track::new(0),
            a: Track::new(0),
            beta: Track::new(1),
        }
    }

    /// The iterates `x₀, x₁, …`.
    pub fn x(&self) -> &Track<DVector<Real>> {
        &self.x
    }

    /// The residuals `r₀, r₁, …`.
    pub fn r(&self) -> &Track<DVector<Real>> {
        &self.r
    }

    /// The search directions `p₀, p₁, …`.
    pub fn p(&self) -> &Track<DVector<Real>> {
        &self.p
    }

    /// The step sizes `a₀, a₁, …`.
    pub fn a(&self) -> &Track<Real> {
        &self.a
    }

    /// The Fletcher–Reeves coefficients `β₁, β₂, …`.
    pub fn beta(&self) -> &Track<Real> {
        &self.beta
    }

    /// Number of completed iterations.
    pub fn iterations(&self) -> usize {
        self.a.len()
    }

    /// Drops whatever was computed by the (unfinished) iteration `epoch`.
    pub(crate) fn discard_from(&mut self, epoch: usize) {
        self.x.truncate(epoch + 1);
        self.r.truncate(epoch);
        self.p.truncate(epoch);
        self.a.truncate(epoch);
        self.beta.truncate(epoch);
    }

    /// Keeps only what the recurrence needs to compute the next iteration.
    pub(crate) fn trim(&mut self) {
        self.x.retain_last(2);
        self.r.retain_last(2);
        self.p.retain_last(2);
        self.a.retain_last(1);
        self.beta.retain_last(1);
    }
}

#[cfg(test)]
mod test {
    use super::Track;

    #[test]
    fn track_indexing_follows_origin() {
        let mut track = Track::new(1);
        assert!(track.is_empty());
        track.push(10.0);
        track.push(20.0);
        assert_eq!(track.len(), 2);
        assert_eq!(track.get(0), None);
        assert_eq!(track[1], 10.0);
        assert_eq!(track[2], 20.0);
        assert_eq!(track.get(3), None);
    }

    #[test]
    fn retain_last_keeps_counts_and_epochs() {
        let mut track = Track::new(0);
        for i in 0..5 {
            track.push(i);
        }

        track.retain_last(2);
        assert_eq!(track.len(), 5);
        assert_eq!(track.first_retained(), 3);
        assert_eq!(track.retained(), &[3, 4]);
        assert_eq!(track.get(2), None);
        assert_eq!(track[4], 4);
        assert_eq!(track.iter().collect::<Vec<_>>(), vec![(3, &3), (4, &4)]);

        track.push(5);
        track.retain_last(2);
        assert_eq!(track.len(), 6);
        assert_eq!(track.retained(), &[4, 5]);
    }

    #[test]
    fn truncate_drops_later_epochs() {
        let mut track = Track::new(1);
        for i in 1..=4 {
            track.push(i);
        }
        track.retain_last(3);
        track.truncate(3);
        assert_eq!(track.len(), 2);
        assert_eq!(track.retained(), &[2]);
        track.truncate(3);
        assert_eq!(track.len(), 2);
    }

    #[test]
    #[should_panic]
    fn forgotten_epoch_panics() {
        let mut track = Track::new(0);
        track.push(1);
        track.push(2);
        track.retain_last(1);
        let _value = track[0];
    }
}
