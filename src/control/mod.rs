
// Control: light control law, its driving loop, and the command slot back to the session.
pub mod command_channel;
pub mod controller;
pub mod control_loop;
