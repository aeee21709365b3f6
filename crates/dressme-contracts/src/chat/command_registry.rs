#[derive(Clone, Copy, Debug)]
pub(crate) struct CommandSpec {
    pub command: &'static str,
    pub action: &'static str,
}

/// Commands whose whole remainder is one free-text argument.
pub(crate) const RAW_ARG_COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        command: "background",
        action: "edit_background",
    },
    CommandSpec {
        command: "video",
        action: "generate_video",
    },
    CommandSpec {
        command: "key",
        action: "set_key",
    },
    CommandSpec {
        command: "image_model",
        action: "set_image_model",
    },
    CommandSpec {
        command: "video_model",
        action: "set_video_model",
    },
];

/// Commands that fill an input slot from a file path. The command name is
/// the slot name.
pub(crate) const SLOT_PATH_COMMANDS: &[&str] = &["model", "top", "bottom"];

pub(crate) const CLEAR_COMMAND: CommandSpec = CommandSpec {
    command: "clear",
    action: "clear_slot",
};

pub(crate) const NO_ARG_COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        command: "look",
        action: "generate_look",
    },
    CommandSpec {
        command: "save",
        action: "save_look",
    },
    CommandSpec {
        command: "logout",
        action: "logout",
    },
    CommandSpec {
        command: "status",
        action: "status",
    },
    CommandSpec {
        command: "help",
        action: "help",
    },
];

pub const CHAT_HELP_COMMANDS: &[&str] = &[
    "/model <path>",
    "/top <path>",
    "/bottom <path>",
    "/clear <model|top|bottom>",
    "/look",
    "/background <description>",
    "/video [prompt]",
    "/save",
    "/key <api key>",
    "/logout",
    "/image_model <name>",
    "/video_model <name>",
    "/status",
    "/help",
];
