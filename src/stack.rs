use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

use bitcoin::hex::DisplayHex;

use crate::number::{is_minimally_encoded, ScriptNum};
use crate::ExecError;

/// Bytes charged per element on top of its length.
pub const ELEMENT_OVERHEAD: u64 = 32;

/// Combined size of a stack and its children, with the ceiling it may not
/// exceed.
#[derive(Debug)]
struct Accumulator {
    combined: Cell<u64>,
    max: u64,
}

impl Accumulator {
    fn increase(&self, by: u64) -> Result<(), ExecError> {
        let next = self
            .combined
            .get()
            .checked_add(by)
            .ok_or(ExecError::StackSize)?;
        if next > self.max {
            return Err(ExecError::StackSize);
        }
        self.combined.set(next);
        Ok(())
    }

    fn decrease(&self, by: u64) {
        self.combined.set(self.combined.get().saturating_sub(by));
    }
}

fn cost(v: &[u8]) -> u64 {
    v.len() as u64 + ELEMENT_OVERHEAD
}

/// A stack of byte strings whose combined size is bounded.
///
/// A stack and the children made with [`make_child`](Self::make_child) share
/// one accumulator, so an element moved between them keeps its cost and the
/// ceiling applies to their sum. Every mutation either succeeds with the
/// accumulator updated or fails leaving both untouched.
#[derive(Debug)]
pub struct LimitedStack {
    elements: Vec<Vec<u8>>,
    acc: Rc<Accumulator>,
}

impl LimitedStack {
    pub fn new(max_size: u64) -> Self {
        Self {
            elements: Vec::new(),
            acc: Rc::new(Accumulator {
                combined: Cell::new(0),
                max: max_size,
            }),
        }
    }

    /// An empty stack accounted against this one's ceiling.
    pub fn make_child(&self) -> Self {
        Self {
            elements: Vec::new(),
            acc: Rc::clone(&self.acc),
        }
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Size of every element in this accounting domain, overhead included.
    pub fn combined_size(&self) -> u64 {
        self.acc.combined.get()
    }

    pub fn max_size(&self) -> u64 {
        self.acc.max
    }

    fn index(&self, offset: isize) -> Result<usize, ExecError> {
        debug_assert!(offset < 0, "offsets should be < 0");
        self.elements
            .len()
            .checked_sub(offset.unsigned_abs())
            .ok_or(ExecError::InvalidStackOperation)
    }

    pub fn top(&self, offset: isize) -> Result<&[u8], ExecError> {
        let i = self.index(offset)?;
        Ok(&self.elements[i])
    }

    pub fn topnum(
        &self,
        offset: isize,
        require_minimal: bool,
        max_size: usize,
    ) -> Result<ScriptNum, ExecError> {
        ScriptNum::from_bytes(self.top(offset)?, require_minimal, max_size)
    }

    pub fn needn(&self, min_nb_items: usize) -> Result<(), ExecError> {
        if self.len() < min_nb_items {
            Err(ExecError::InvalidStackOperation)
        } else {
            Ok(())
        }
    }

    pub fn push(&mut self, v: Vec<u8>) -> Result<(), ExecError> {
        self.acc.increase(cost(&v))?;
        self.elements.push(v);
        Ok(())
    }

    pub fn pushnum(&mut self, n: &ScriptNum) -> Result<(), ExecError> {
        self.push(n.to_bytes())
    }

    pub fn pushbool(&mut self, b: bool) -> Result<(), ExecError> {
        self.push(if b { vec![1] } else { Vec::new() })
    }

    pub fn pop(&mut self) -> Result<Vec<u8>, ExecError> {
        let v = self.elements.pop().ok_or(ExecError::InvalidStackOperation)?;
        self.acc.decrease(cost(&v));
        Ok(v)
    }

    /// Checks that an element of `len` bytes would fit once the top `popped`
    /// elements are gone, without building it.
    pub fn fits_after_pop(&self, popped: usize, len: usize) -> Result<(), ExecError> {
        self.needn(popped)?;
        let freed: u64 = self.elements[self.elements.len() - popped..]
            .iter()
            .map(|v| cost(v))
            .sum();
        let need = (len as u64)
            .checked_add(ELEMENT_OVERHEAD)
            .and_then(|c| c.checked_add(self.acc.combined.get().saturating_sub(freed)))
            .ok_or(ExecError::StackSize)?;
        if need > self.acc.max {
            return Err(ExecError::StackSize);
        }
        Ok(())
    }

    pub fn popnum(&mut self, require_minimal: bool, max_size: usize) -> Result<ScriptNum, ExecError> {
        let n = self.topnum(-1, require_minimal, max_size)?;
        self.pop()?;
        Ok(n)
    }

    pub fn popn(&mut self, n: usize) -> Result<(), ExecError> {
        self.needn(n)?;
        for _ in 0..n {
            self.pop()?;
        }
        Ok(())
    }

    /// Replaces the top element.
    pub fn replace_top(&mut self, v: Vec<u8>) -> Result<(), ExecError> {
        let i = self.index(-1)?;
        let old = cost(&self.elements[i]);
        let new = cost(&v);
        if new > old {
            self.acc.increase(new - old)?;
        } else {
            self.acc.decrease(old - new);
        }
        self.elements[i] = v;
        Ok(())
    }

    /// Inserts `v` so that it ends up at `top(offset)`.
    pub fn insert_at(&mut self, offset: isize, v: Vec<u8>) -> Result<(), ExecError> {
        debug_assert!(offset < 0, "offsets should be < 0");
        let i = (self.elements.len() + 1)
            .checked_sub(offset.unsigned_abs())
            .ok_or(ExecError::InvalidStackOperation)?;
        self.acc.increase(cost(&v))?;
        self.elements.insert(i, v);
        Ok(())
    }

    /// Removes and returns the element at `top(offset)`.
    pub fn erase(&mut self, offset: isize) -> Result<Vec<u8>, ExecError> {
        let i = self.index(offset)?;
        let v = self.elements.remove(i);
        self.acc.decrease(cost(&v));
        Ok(v)
    }

    /// Removes the elements from `top(first)` up to but excluding
    /// `top(last)`, `last == 0` meaning through the top.
    pub fn erase_range(&mut self, first: isize, last: isize) -> Result<Vec<Vec<u8>>, ExecError> {
        let from = self.index(first)?;
        let to = if last == 0 { self.len() } else { self.index(last)? };
        if from > to {
            return Err(ExecError::InvalidStackOperation);
        }
        let removed: Vec<Vec<u8>> = self.elements.drain(from..to).collect();
        for v in &removed {
            self.acc.decrease(cost(v));
        }
        Ok(removed)
    }

    pub fn swap(&mut self, a: isize, b: isize) -> Result<(), ExecError> {
        let a = self.index(a)?;
        let b = self.index(b)?;
        self.elements.swap(a, b);
        Ok(())
    }

    /// Moves the top element onto `other` without changing the combined size.
    ///
    /// Both stacks must belong to the same accounting domain.
    pub fn move_top_to(&mut self, other: &mut LimitedStack) -> Result<(), ExecError> {
        if !Rc::ptr_eq(&self.acc, &other.acc) {
            return Err(ExecError::InvalidStackOperation);
        }
        let v = self.elements.pop().ok_or(ExecError::InvalidStackOperation)?;
        other.elements.push(v);
        Ok(())
    }

    /// Empties the stack into `out`, releasing the memory of every element.
    pub fn drain_into(&mut self, out: &mut Vec<Vec<u8>>) {
        for v in self.elements.drain(..) {
            self.acc.decrease(cost(&v));
            out.push(v);
        }
    }

    pub fn clear(&mut self) {
        let mut discarded = Vec::new();
        self.drain_into(&mut discarded);
    }

    /// Elements from bottom to top.
    pub fn iter(&self) -> impl Iterator<Item = &[u8]> + Clone {
        self.elements.iter().map(Vec::as_slice)
    }

    pub fn to_vec(&self) -> Vec<Vec<u8>> {
        self.elements.clone()
    }
}

impl Drop for LimitedStack {
    fn drop(&mut self) {
        // children give their share back to the parent
        for v in &self.elements {
            self.acc.decrease(cost(v));
        }
    }
}

/// Prints the stack top first, short numbers as decimals and the rest as hex.
impl fmt::Display for LimitedStack {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut iter = self.elements.iter().rev().peekable();
        while let Some(v) = iter.next() {
            if v.is_empty() {
                write!(f, "0")?;
            } else if v.len() <= 4 && is_minimally_encoded(v, 4) {
                match ScriptNum::from_bytes(v, true, 4) {
                    Ok(n) => write!(f, "{}", n)?,
                    Err(_) => write!(f, "{}", v.as_hex())?,
                }
            } else {
                write!(f, "{}", v.as_hex())?;
            }
            if iter.peek().is_some() {
                write!(f, " ")?;
            }
        }
        Ok(())
    }
}

/// State of one open conditional: which part of it is running and whether
/// that part is taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Branch {
    If(bool),
    Else(bool),
}

impl Branch {
    pub fn taken(self) -> bool {
        match self {
            Branch::If(taken) | Branch::Else(taken) => taken,
        }
    }
}

/// Open conditionals during script execution.
///
/// Only the top entry can be observed or changed, and the machine only needs
/// to know whether every open branch is taken. The position of the first
/// untaken branch is cached so that question is answered in constant time.
#[derive(Debug, Default)]
pub struct ConditionStack {
    branches: Vec<Branch>,
    /// The position of the first untaken branch, `None` if all are taken.
    first_false_pos: Option<usize>,
}

impl ConditionStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn all_true(&self) -> bool {
        self.first_false_pos.is_none()
    }

    pub fn is_empty(&self) -> bool {
        self.branches.is_empty()
    }

    pub fn len(&self) -> usize {
        self.branches.len()
    }

    pub fn top(&self) -> Option<Branch> {
        self.branches.last().copied()
    }

    /// Opens a conditional.
    pub fn push(&mut self, taken: bool) {
        if self.first_false_pos.is_none() && !taken {
            self.first_false_pos = Some(self.branches.len());
        }
        self.branches.push(Branch::If(taken));
    }

    /// Closes the innermost conditional.
    pub fn pop(&mut self) -> Result<Branch, ExecError> {
        let branch = self.branches.pop().ok_or(ExecError::UnbalancedConditional)?;
        if self.first_false_pos == Some(self.branches.len()) {
            // popping the first untaken branch makes everything taken
            self.first_false_pos = None;
        }
        Ok(branch)
    }

    /// Switches the innermost conditional to its `ELSE` part.
    ///
    /// With `single_else` a conditional that is already in its `ELSE` part
    /// is rejected.
    pub fn toggle_top(&mut self, single_else: bool) -> Result<(), ExecError> {
        let top = self.branches.len().checked_sub(1).ok_or(ExecError::UnbalancedConditional)?;
        let branch = self.branches[top];
        if single_else && matches!(branch, Branch::Else(_)) {
            return Err(ExecError::UnbalancedConditional);
        }
        let taken = !branch.taken();
        self.branches[top] = Branch::Else(taken);

        match self.first_false_pos {
            // all taken, the top becomes the first untaken one
            None => self.first_false_pos = Some(top),
            // the top was the first untaken one
            Some(pos) if pos == top => self.first_false_pos = None,
            // an untaken branch below hides the top
            Some(_) => {}
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn accounting() {
        let mut stack = LimitedStack::new(1000);
        stack.push(vec![]).unwrap();
        assert_eq!(stack.combined_size(), 32);
        stack.push(vec![1]).unwrap();
        assert_eq!(stack.combined_size(), 65);
        stack.replace_top(vec![1, 2, 3]).unwrap();
        assert_eq!(stack.combined_size(), 67);
        stack.pop().unwrap();
        stack.pop().unwrap();
        assert_eq!(stack.combined_size(), 0);
        assert_eq!(stack.pop(), Err(ExecError::InvalidStackOperation));
    }

    #[test]
    fn ceiling_rejects_atomically() {
        let mut stack = LimitedStack::new(200);
        stack.push(vec![0; 40]).unwrap();
        stack.push(vec![0; 40]).unwrap();
        assert_eq!(stack.combined_size(), 144);
        assert_eq!(stack.push(vec![0; 40]), Err(ExecError::StackSize));
        assert_eq!(stack.len(), 2);
        assert_eq!(stack.combined_size(), 144);

        assert_eq!(stack.replace_top(vec![0; 100]), Err(ExecError::StackSize));
        assert_eq!(stack.top(-1).unwrap(), &[0; 40][..]);

        let mut small = LimitedStack::new(100);
        small.push(vec![0; 40]).unwrap();
        assert_eq!(small.push(vec![0; 40]), Err(ExecError::StackSize));
        assert_eq!(small.len(), 1);
    }

    #[test]
    fn room_after_pop() {
        let mut stack = LimitedStack::new(144);
        stack.push(vec![0; 40]).unwrap();
        stack.push(vec![0; 40]).unwrap();
        assert_eq!(stack.fits_after_pop(0, 0), Err(ExecError::StackSize));
        assert_eq!(stack.fits_after_pop(1, 40), Ok(()));
        assert_eq!(stack.fits_after_pop(1, 41), Err(ExecError::StackSize));
        assert_eq!(stack.fits_after_pop(2, 112), Ok(()));
        assert_eq!(stack.fits_after_pop(2, usize::MAX), Err(ExecError::StackSize));
        assert_eq!(stack.fits_after_pop(3, 0), Err(ExecError::InvalidStackOperation));
        assert_eq!(stack.combined_size(), 144);
    }

    #[test]
    fn pop_number() {
        let mut stack = LimitedStack::new(1000);
        stack.push(vec![0x05, 0x00]).unwrap();
        assert_eq!(stack.popnum(true, 4), Err(ExecError::ScriptNumMinEncode));
        assert_eq!(stack.len(), 1);
        assert_eq!(stack.popnum(false, 4), Ok(ScriptNum::from(5)));
        assert!(stack.is_empty());
        assert_eq!(stack.combined_size(), 0);
    }

    #[test]
    fn child_shares_the_ceiling() {
        let mut main = LimitedStack::new(1000);
        let mut alt = main.make_child();
        main.push(vec![1, 2]).unwrap();
        main.push(vec![3]).unwrap();
        main.move_top_to(&mut alt).unwrap();
        assert_eq!(main.len(), 1);
        assert_eq!(alt.len(), 1);
        assert_eq!(main.combined_size(), 67);
        assert_eq!(alt.combined_size(), 67);

        alt.move_top_to(&mut main).unwrap();
        assert_eq!(main.top(-1).unwrap(), &[3]);

        let mut stranger = LimitedStack::new(1000);
        assert_eq!(
            main.move_top_to(&mut stranger),
            Err(ExecError::InvalidStackOperation)
        );
        assert_eq!(main.len(), 2);
    }

    #[test]
    fn dropping_a_child_releases_its_elements() {
        let main = LimitedStack::new(1000);
        {
            let mut alt = main.make_child();
            alt.push(vec![9; 8]).unwrap();
            assert_eq!(main.combined_size(), 40);
        }
        assert_eq!(main.combined_size(), 0);
    }

    #[test]
    fn drain_releases_memory() {
        let mut main = LimitedStack::new(1000);
        let mut alt = main.make_child();
        alt.push(vec![1]).unwrap();
        alt.push(vec![2]).unwrap();
        main.push(vec![3]).unwrap();
        let mut out = Vec::new();
        alt.drain_into(&mut out);
        assert_eq!(out, vec![vec![1], vec![2]]);
        assert!(alt.is_empty());
        assert_eq!(main.combined_size(), 33);
    }

    #[test]
    fn positional_operations() {
        let mut stack = LimitedStack::new(10_000);
        for i in 1..=5u8 {
            stack.push(vec![i]).unwrap();
        }
        // 1 2 3 4 5
        stack.insert_at(-3, vec![9]).unwrap();
        assert_eq!(stack.to_vec(), vec![vec![1], vec![2], vec![3], vec![9], vec![4], vec![5]]);
        assert_eq!(stack.erase(-3).unwrap(), vec![9]);
        stack.swap(-1, -5).unwrap();
        assert_eq!(stack.to_vec(), vec![vec![5], vec![2], vec![3], vec![4], vec![1]]);
        let removed = stack.erase_range(-4, -2).unwrap();
        assert_eq!(removed, vec![vec![2], vec![3]]);
        assert_eq!(stack.to_vec(), vec![vec![5], vec![4], vec![1]]);
        assert_eq!(stack.combined_size(), 3 * 33);

        assert_eq!(stack.top(-4), Err(ExecError::InvalidStackOperation));
        assert_eq!(stack.insert_at(-5, vec![]), Err(ExecError::InvalidStackOperation));
        stack.insert_at(-4, vec![]).unwrap();
        assert_eq!(stack.top(-4).unwrap(), &[] as &[u8]);
    }

    #[test]
    fn display_top_first() {
        let mut stack = LimitedStack::new(10_000);
        stack.push(vec![]).unwrap();
        stack.push(vec![0xff, 0x00]).unwrap();
        stack.push(vec![0xde, 0xad, 0xbe, 0xef, 0x01]).unwrap();
        assert_eq!(stack.to_string(), "deadbeef01 255 0");
    }

    #[test]
    fn condition_stack() {
        let mut c = ConditionStack::new();
        assert!(c.all_true());
        c.push(true);
        c.push(false);
        assert!(!c.all_true());
        c.push(true);
        assert!(!c.all_true());
        c.toggle_top(true).unwrap();
        assert_eq!(c.top(), Some(Branch::Else(false)));
        assert!(!c.all_true());
        assert_eq!(c.toggle_top(true), Err(ExecError::UnbalancedConditional));
        c.pop().unwrap();
        c.toggle_top(true).unwrap();
        assert!(c.all_true());
        c.pop().unwrap();
        c.pop().unwrap();
        assert!(c.is_empty());
        assert_eq!(c.pop(), Err(ExecError::UnbalancedConditional));
        assert_eq!(c.toggle_top(false), Err(ExecError::UnbalancedConditional));
    }

    #[test]
    fn repeated_else_before_genesis() {
        let mut c = ConditionStack::new();
        c.push(true);
        c.toggle_top(false).unwrap();
        assert!(!c.all_true());
        c.toggle_top(false).unwrap();
        assert!(c.all_true());
        assert_eq!(c.top(), Some(Branch::Else(true)));
    }

    #[derive(Debug, Clone)]
    enum Action {
        Push(usize, bool),
        Pop(bool),
        Insert(usize),
        Erase(usize),
        Move(bool),
    }

    fn action() -> impl Strategy<Value = Action> {
        prop_oneof![
            (0..64usize, any::<bool>()).prop_map(|(n, alt)| Action::Push(n, alt)),
            any::<bool>().prop_map(Action::Pop),
            (1..4usize).prop_map(Action::Insert),
            (1..4usize).prop_map(Action::Erase),
            any::<bool>().prop_map(Action::Move),
        ]
    }

    fn expected(main: &LimitedStack, alt: &LimitedStack) -> u64 {
        main.iter().chain(alt.iter()).map(cost).sum()
    }

    proptest! {
        #[test]
        fn combined_size_tracks_live_elements(actions in proptest::collection::vec(action(), 0..64)) {
            let mut main = LimitedStack::new(600);
            let mut alt = main.make_child();
            for action in actions {
                let (len_before, size_before) = (main.len() + alt.len(), main.combined_size());
                let res = match action {
                    Action::Push(n, false) => main.push(vec![7; n]),
                    Action::Push(n, true) => alt.push(vec![7; n]),
                    Action::Pop(false) => main.pop().map(|_| ()),
                    Action::Pop(true) => alt.pop().map(|_| ()),
                    Action::Insert(k) => main.insert_at(-(k as isize), vec![1; k]),
                    Action::Erase(k) => main.erase(-(k as isize)).map(|_| ()),
                    Action::Move(false) => main.move_top_to(&mut alt),
                    Action::Move(true) => alt.move_top_to(&mut main),
                };
                if res.is_err() {
                    prop_assert_eq!(main.len() + alt.len(), len_before);
                    prop_assert_eq!(main.combined_size(), size_before);
                }
                prop_assert!(main.combined_size() <= main.max_size());
                prop_assert_eq!(main.combined_size(), expected(&main, &alt));
            }
        }
    }
}
