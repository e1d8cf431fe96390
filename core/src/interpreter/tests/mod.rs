mod helpers;

mod action_tests;
mod property_action_tests;
