pub(super) mod lock;
pub(super) mod publish;
pub(super) mod refresh;
pub(super) mod run;
pub(super) mod score;
pub(super) mod tick;
