//! Instruction execution handlers

mod arrays;
mod assign;
mod calls;
mod control;
mod inline;
mod loops;
mod stack;
