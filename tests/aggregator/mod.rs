mod collaborators;
mod scenarios;
